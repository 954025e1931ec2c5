pub mod ids;
pub mod run;
pub mod session;
pub mod stats;
pub mod team;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::time::Instant;

    use uuid::Uuid;

    use crate::ids::{PlayerId, TeamId};
    use crate::run::SpawnPoint;
    use crate::team::Team;

    /// Create a team of `n` fresh player ids; the first is the leader.
    pub fn make_team(n: usize) -> (Team, Vec<PlayerId>) {
        let ids: Vec<PlayerId> = (0..n).map(|_| Uuid::new_v4()).collect();
        let mut team = Team::new(TeamId::new_v4(), "Team", ids[0], Instant::now());
        for id in &ids[1..] {
            team.add_member(*id);
        }
        (team, ids)
    }

    /// A line of `n` spawn points at y=64, one block apart on x.
    pub fn make_spawn_points(n: usize) -> Vec<SpawnPoint> {
        (0..n)
            .map(|i| SpawnPoint {
                x: i as f64,
                y: 64.0,
                z: 0.0,
                yaw: 0.0,
            })
            .collect()
    }
}
