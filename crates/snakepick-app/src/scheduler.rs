// Lock-time allocation job.
//
// Periodically looks for draft windows that have locked and runs the snake
// allocation once for each of their roles that has no recorded allocation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use snakepick_core::db::DraftStore;
use snakepick_core::draft::player::{Role, WindowId};
use snakepick_core::draft::window::{Clock, WindowStatus};
use snakepick_core::service::RankingService;

/// Messages accepted by the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Sweep now instead of waiting for the next tick.
    SweepNow,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedRole {
    pub window: WindowId,
    pub role: Role,
    pub assignments: usize,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub allocated: Vec<AllocatedRole>,
    pub failed: Vec<(WindowId, Role)>,
}

/// Allocate every (locked window, role) pair that is still unallocated.
///
/// A failure for one pair is logged and recorded in the report; the rest of
/// the sweep carries on.
pub fn sweep<S: DraftStore, C: Clock>(service: &RankingService<S, C>) -> anyhow::Result<SweepReport> {
    let now = service.clock().now();
    let mut report = SweepReport::default();

    let windows = service.store().all_windows()?;
    for window in windows
        .iter()
        .filter(|w| w.status_at(now) == WindowStatus::Locked)
    {
        for &role in &window.roles {
            match service.store().allocation_completed(window.id, role) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    error!("failed to check allocation state for {} {}: {:#}", window.id, role, e);
                    report.failed.push((window.id, role));
                    continue;
                }
            }

            match service.run_snake_assignment(window.id, role) {
                Ok(outcome) => report.allocated.push(AllocatedRole {
                    window: window.id,
                    role,
                    assignments: outcome.assignments.len(),
                }),
                Err(e) => {
                    error!("allocation failed for {} {}: {}", window.id, role, e);
                    report.failed.push((window.id, role));
                }
            }
        }
    }

    Ok(report)
}

/// Run the scheduler until a `Shutdown` command arrives or the command
/// channel closes. The first sweep happens immediately.
pub async fn run<S, C>(
    service: Arc<RankingService<S, C>>,
    tick: Duration,
    mut cmd_rx: mpsc::Receiver<SchedulerCommand>,
) -> anyhow::Result<()>
where
    S: DraftStore + 'static,
    C: Clock + 'static,
{
    info!("Allocation scheduler started (tick {:?})", tick);

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_blocking(&service).await;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SchedulerCommand::SweepNow) => {
                        sweep_blocking(&service).await;
                    }
                    Some(SchedulerCommand::Shutdown) => {
                        info!("Shutdown command received, stopping scheduler");
                        break;
                    }
                    None => {
                        info!("Scheduler command channel closed, stopping scheduler");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// A sweep does synchronous SQLite and allocation work, so it runs on the
/// blocking pool. The loop waits for it before taking the next event.
async fn sweep_blocking<S, C>(service: &Arc<RankingService<S, C>>)
where
    S: DraftStore + 'static,
    C: Clock + 'static,
{
    let service = Arc::clone(service);
    if let Err(e) = tokio::task::spawn_blocking(move || run_sweep(&service)).await {
        error!("allocation sweep task failed: {}", e);
    }
}

fn run_sweep<S: DraftStore, C: Clock>(service: &RankingService<S, C>) {
    match sweep(service) {
        Ok(report) => {
            for done in &report.allocated {
                info!(
                    "Allocated {} {}: {} assignments",
                    done.window, done.role, done.assignments
                );
            }
        }
        Err(e) => error!("allocation sweep failed: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use snakepick_core::db::Database;
    use snakepick_core::draft::player::{Player, PlayerId, PlayerStats, SquadId};
    use snakepick_core::draft::window::{DraftWindow, FixedClock, WindowKind};
    use snakepick_core::service::DraftRules;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, day, 12, 0, 0).unwrap()
    }

    /// Window 1 locks on day 2, window 2 locks on day 6.
    fn service_at(now: DateTime<Utc>) -> RankingService<Database, FixedClock> {
        let db = Database::open(":memory:").unwrap();
        let players: Vec<Player> = [(1, Role::Bat), (2, Role::Bat), (3, Role::Wk), (4, Role::Wk)]
            .into_iter()
            .map(|(id, role)| Player {
                id: PlayerId(id),
                name: format!("P{id}"),
                role,
                team: "T".to_string(),
                stats: PlayerStats {
                    points: 10.0 * id as f64,
                    ..Default::default()
                },
            })
            .collect();
        db.import_players(&players).unwrap();
        for (id, open, lock) in [(1, 1, 2), (2, 5, 6)] {
            db.upsert_window(&DraftWindow {
                id: WindowId(id),
                season: 2026,
                kind: WindowKind::PreSeason,
                sequence: id,
                open_at: t(open),
                lock_at: t(lock),
                roles: vec![Role::Bat, Role::Wk],
            })
            .unwrap();
        }
        RankingService::new(
            db,
            FixedClock::new(now),
            DraftRules::new(vec![SquadId(1), SquadId(2)]),
        )
    }

    #[test]
    fn sweep_allocates_only_locked_windows() {
        let svc = service_at(t(3));
        let report = sweep(&svc).unwrap();
        assert_eq!(report.allocated.len(), 2);
        assert!(report.allocated.iter().all(|a| a.window == WindowId(1)));
        assert!(report.failed.is_empty());
        assert!(!svc
            .store()
            .allocation_completed(WindowId(2), Role::Bat)
            .unwrap());
    }

    #[test]
    fn sweep_skips_completed_allocations() {
        let svc = service_at(t(3));
        sweep(&svc).unwrap();
        let again = sweep(&svc).unwrap();
        assert!(again.allocated.is_empty());

        svc.clock().set(t(7));
        let later = sweep(&svc).unwrap();
        assert_eq!(later.allocated.len(), 2);
        assert!(later.allocated.iter().all(|a| a.window == WindowId(2)));
    }

    #[test]
    fn sweep_before_any_lock_does_nothing() {
        let svc = service_at(t(1));
        assert_eq!(sweep(&svc).unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn run_sweeps_on_command_and_stops() {
        tokio::time::pause();
        let svc = Arc::new(service_at(t(1)));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let handle = tokio::spawn(run(Arc::clone(&svc), Duration::from_secs(3600), cmd_rx));

        svc.clock().set(t(3));
        cmd_tx.send(SchedulerCommand::SweepNow).await.unwrap();
        cmd_tx.send(SchedulerCommand::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        for role in [Role::Bat, Role::Wk] {
            assert!(svc.store().allocation_completed(WindowId(1), role).unwrap());
        }
    }

    #[tokio::test]
    async fn run_sweeps_on_tick() {
        tokio::time::pause();
        let svc = Arc::new(service_at(t(3)));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let handle = tokio::spawn(run(Arc::clone(&svc), Duration::from_secs(30), cmd_rx));

        // Let the immediate first tick start its sweep.
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(cmd_tx);
        handle.await.unwrap().unwrap();

        // The loop only reads the closed channel after the sweep finished.
        for role in [Role::Bat, Role::Wk] {
            assert!(svc.store().allocation_completed(WindowId(1), role).unwrap());
        }
        assert!(!svc
            .store()
            .allocation_completed(WindowId(2), Role::Bat)
            .unwrap());
    }
}
