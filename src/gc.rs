//! Victim selection, page relocation, erase, and pointer fix-up.
use crate::{
    cmt::Cmt,
    deps::log::debug,
    flash::{BlockId, Flash},
    mapping::Gmd,
    metrics::{Metrics, PageKind},
};

pub struct GarbageCollector {
    threshold: f64,
}

impl GarbageCollector {
    pub fn new(threshold: f64) -> Self {
        GarbageCollector { threshold }
    }

    pub fn should_run(
        &self,
        flash: &Flash,
    ) -> bool {
        flash.utilization() >= self.threshold
    }

    fn select_victim(
        &self,
        flash: &Flash,
    ) -> Option<BlockId> {
        let mut best: Option<(BlockId, usize)> = None;
        for bid in 0..flash.total_blocks() {
            let invalid = flash.invalid_count_in_block(bid);
            if invalid == 0 {
                continue;
            }
            match best {
                Some((_, best_count)) if invalid <= best_count => {}
                _ => best = Some((bid, invalid)),
            }
        }
        best.map(|(bid, _)| bid)
    }

    /// Runs GC rounds until `!force && !should_run()`, no victim remains, or
    /// `max_rounds` is exhausted. Returns the number of blocks collected.
    pub fn run(
        &self,
        flash: &mut Flash,
        gmd: &mut Gmd,
        cmt: &mut Cmt,
        metrics: &mut Metrics,
        max_rounds: usize,
        force: bool,
    ) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds {
            if !force && !self.should_run(flash) {
                break;
            }
            let victim = match self.select_victim(flash) {
                Some(v) => v,
                None => break,
            };

            debug!("GC collecting block {}", victim);
            let mut relocated_all = true;
            for (old_pid, kind) in flash.valid_pages_in_block(victim) {
                flash.read_page(old_pid, kind);
                metrics.charge_gc_read(kind);
                let new_pid = match flash.allocate_page() {
                    Ok(pid) => pid,
                    Err(_) => {
                        relocated_all = false;
                        break;
                    }
                };
                flash.write_page(new_pid, kind);
                metrics.charge_flash_write();

                match kind {
                    PageKind::Data => {
                        gmd.rebind_data_page(old_pid, new_pid);
                        cmt.update_data_page(old_pid, new_pid);
                    }
                    PageKind::Translation => {
                        gmd.rebind_flash_page(old_pid, new_pid);
                    }
                }
                metrics.gc_pages_copied += 1;
            }

            if !relocated_all {
                debug!("GC aborting block {}: no free page to relocate into", victim);
                break;
            }

            flash.erase_block(victim);
            metrics.charge_flash_erase();
            metrics.gc_invocations += 1;
            rounds += 1;
        }
        rounds
    }
}
