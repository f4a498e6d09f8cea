//! Counters, per-request flash-read histogram, and latency percentiles.
//!
//! Metrics is process-wide per [`crate::KvSsd`]; increments happen on the
//! request thread under the single-threaded contract, so no atomics are
//! needed.
use crate::deps::serde;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PageKind {
    #[default]
    Data,
    Translation,
}


#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Metrics {
    pub tp_reads:          u64,
    pub data_reads:        u64,
    pub flash_writes:      u64,
    pub flash_erases:      u64,
    pub cmt_hits:          u64,
    pub cmt_misses:        u64,
    pub inline_entries:    u64,
    pub regular_entries:   u64,
    pub inline_to_regular: u64,
    pub gc_invocations:    u64,
    pub gc_pages_copied:   u64,
    pub host_writes:       u64,
    pub total_puts:        u64,
    pub total_gets:        u64,
    pub total_deletes:     u64,

    /// `reads_by_flash_count[k]` = number of GETs that issued exactly `k`
    /// flash reads.
    reads_by_flash_count: Vec<u64>,
    /// Per-GET latency in microseconds, in request order.
    get_latencies_us:     Vec<f64>,

    /// Per-request scratch counter, reset at the start of every GET and
    /// folded into the histogram/latency vectors when the request ends.
    #[serde(skip)]
    request_reads: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the per-request flash-read scratch counter. Called at the
    /// start of every GET.
    pub fn begin_request(&mut self) {
        self.request_reads = 0;
    }

    pub fn charge_tp_read(&mut self) {
        self.tp_reads += 1;
        self.request_reads += 1;
    }

    pub fn charge_data_read(&mut self) {
        self.data_reads += 1;
        self.request_reads += 1;
    }

    /// Charges a flash read incurred by GC relocation. Counts toward
    /// `total_flash_reads` but, per the histogram's contract, is never
    /// folded into `reads_by_flash_count` — GC does not run inside a GET
    /// request.
    pub fn charge_gc_read(
        &mut self,
        kind: PageKind,
    ) {
        match kind {
            PageKind::Data => self.data_reads += 1,
            PageKind::Translation => self.tp_reads += 1,
        }
    }

    pub fn charge_flash_write(&mut self) {
        self.flash_writes += 1;
    }

    pub fn charge_flash_erase(&mut self) {
        self.flash_erases += 1;
    }

    /// Records the outcome of the GET request that was just served: the
    /// number of flash reads it issued and the derived latency, summed
    /// across reads at `read_latency_us` each.
    pub fn end_get_request(
        &mut self,
        read_latency_us: f64,
    ) {
        let reads = self.request_reads as usize;
        if self.reads_by_flash_count.len() <= reads {
            self.reads_by_flash_count.resize(reads + 1, 0);
        }
        self.reads_by_flash_count[reads] += 1;
        self.get_latencies_us.push(reads as f64 * read_latency_us);
    }

    pub fn reads_by_flash_count(&self) -> &[u64] {
        &self.reads_by_flash_count
    }

    pub fn get_latencies_us(&self) -> &[f64] {
        &self.get_latencies_us
    }

    pub fn total_flash_reads(&self) -> u64 {
        self.tp_reads + self.data_reads
    }

    pub fn cmt_hit_rate(&self) -> f64 {
        let total = self.cmt_hits + self.cmt_misses;
        if total == 0 {
            0.0
        } else {
            self.cmt_hits as f64 / total as f64
        }
    }

    pub fn inline_ratio(&self) -> f64 {
        let total = self.inline_entries + self.regular_entries;
        if total == 0 {
            0.0
        } else {
            self.inline_entries as f64 / total as f64
        }
    }

    pub fn reads_with_one_or_fewer(&self) -> f64 {
        let total: u64 = self.reads_by_flash_count.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let one_or_fewer: u64 = self.reads_by_flash_count.iter().take(2).sum();
        one_or_fewer as f64 / total as f64
    }

    pub fn waf(&self) -> f64 {
        if self.host_writes == 0 {
            0.0
        } else {
            self.flash_writes as f64 / self.host_writes as f64
        }
    }

    /// Latency percentile (0.0..=100.0) over the recorded per-GET latencies,
    /// using nearest-rank interpolation on a sorted copy.
    pub fn latency_percentile(
        &self,
        pct: f64,
    ) -> f64 {
        if self.get_latencies_us.is_empty() {
            return 0.0;
        }
        let mut sorted = self.get_latencies_us.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rank = ((pct / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }

    pub fn p50(&self) -> f64 {
        self.latency_percentile(50.0)
    }

    pub fn p99(&self) -> f64 {
        self.latency_percentile(99.0)
    }

    pub fn p999(&self) -> f64 {
        self.latency_percentile(99.9)
    }

    /// Sampled (latency, cdf) pairs over `buckets` evenly spaced percentiles.
    pub fn latency_cdf(
        &self,
        buckets: usize,
    ) -> Vec<(f64, f64)> {
        if buckets == 0 || self.get_latencies_us.is_empty() {
            return Vec::new();
        }
        (1..=buckets)
            .map(|i| {
                let cdf = i as f64 / buckets as f64;
                (self.latency_percentile(cdf * 100.0), cdf)
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_and_total_flash_reads_agree() {
        let mut m = Metrics::new();
        m.begin_request();
        m.charge_tp_read();
        m.end_get_request(45.0);

        m.begin_request();
        m.charge_tp_read();
        m.charge_data_read();
        m.end_get_request(45.0);

        assert_eq!(m.reads_by_flash_count(), &[0, 1, 1]);
        assert_eq!(m.total_flash_reads(), 3);
        assert_eq!(m.get_latencies_us(), &[45.0, 90.0]);
    }

    #[test]
    fn derived_rates_are_zero_when_empty() {
        let m = Metrics::new();
        assert_eq!(m.cmt_hit_rate(), 0.0);
        assert_eq!(m.inline_ratio(), 0.0);
        assert_eq!(m.waf(), 0.0);
    }
}
