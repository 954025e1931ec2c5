use std::sync::Arc;
use std::time::Instant;

use holdout_core::ids::{PlayerId, TeamId};
use holdout_core::session::PlayerMode;

use crate::config::ServerConfig;
use crate::error::Rejection;
use crate::notify::Notifier;
use crate::ready::ReadyCoordinator;
use crate::registry::StateRegistry;

/// Team membership flows with their guards: create, invite, accept,
/// decline, leave, kick, transfer, disband. Rule violations come back as
/// typed rejections for the command layer to phrase; nothing here panics
/// the caller.
pub struct PartyCoordinator {
    registry: Arc<StateRegistry>,
    config: Arc<ServerConfig>,
    notifier: Arc<dyn Notifier>,
    ready: Arc<ReadyCoordinator>,
}

impl PartyCoordinator {
    pub fn new(
        registry: Arc<StateRegistry>,
        config: Arc<ServerConfig>,
        notifier: Arc<dyn Notifier>,
        ready: Arc<ReadyCoordinator>,
    ) -> Self {
        Self {
            registry,
            config,
            notifier,
            ready,
        }
    }

    /// Creates a team led by `founder`. The registry enforces the lobby /
    /// teamless / unique-name guards.
    pub fn create(&self, founder: PlayerId, name: &str, now: Instant) -> Result<TeamId, Rejection> {
        let team = self.registry.create_team(name, founder, now)?;
        let team_id = team.lock().unwrap().id();
        self.notifier.notify(founder, "team.created", name);
        Ok(team_id)
    }

    /// Leader invites another lobby player. The invite expires on its own;
    /// nothing needs to clean it up.
    pub fn invite(
        &self,
        inviter: PlayerId,
        invitee: PlayerId,
        now: Instant,
    ) -> Result<(), Rejection> {
        if inviter == invitee {
            return Err(Rejection::CannotInviteSelf);
        }
        let team = self
            .registry
            .player_team(inviter)
            .ok_or(Rejection::NotInTeam)?;
        if self.registry.player(invitee).is_none() {
            return Err(Rejection::PlayerNotFound);
        }
        if self.registry.is_in_team(invitee) {
            return Err(Rejection::TargetInTeam);
        }

        {
            let mut team = team.lock().unwrap();
            if !team.is_leader(inviter) {
                return Err(Rejection::NotLeader);
            }
            if team.member_count() >= self.config.teams.max_size {
                return Err(Rejection::TeamFull);
            }
            team.add_invite(invitee, now + self.config.invite_expiry());
        }
        self.notifier.notify(invitee, "team.invite_received", "");
        Ok(())
    }

    /// Invitee accepts. The invite is checked (and consumed) lazily, so an
    /// expired one reads as absent.
    pub fn accept_invite(
        &self,
        invitee: PlayerId,
        team_name: &str,
        now: Instant,
    ) -> Result<TeamId, Rejection> {
        if self.registry.is_in_team(invitee) {
            return Err(Rejection::AlreadyInTeam);
        }
        let team = self
            .registry
            .find_team_by_name(team_name)
            .ok_or(Rejection::TeamNotFound)?;

        let (team_id, members) = {
            let mut team = team.lock().unwrap();
            if !team.has_invite(invitee, now) {
                return Err(Rejection::NoInvite);
            }
            if team.member_count() >= self.config.teams.max_size {
                return Err(Rejection::TeamFull);
            }
            team.remove_invite(invitee);
            (team.id(), team.members())
        };

        self.registry.add_player_to_team(invitee, team_id)?;
        self.notifier.notify(invitee, "team.joined", team_name);
        for member in members {
            self.notifier.notify(member, "team.member_joined", "");
        }
        Ok(team_id)
    }

    pub fn decline_invite(&self, invitee: PlayerId, team_name: &str) -> Result<(), Rejection> {
        let team = self
            .registry
            .find_team_by_name(team_name)
            .ok_or(Rejection::TeamNotFound)?;
        team.lock().unwrap().remove_invite(invitee);
        self.notifier.notify(invitee, "team.invite_declined", team_name);
        Ok(())
    }

    /// Leaving is barred mid-run; a departing member also cancels any
    /// countdown their readiness was part of.
    pub fn leave(&self, player: PlayerId) -> Result<(), Rejection> {
        let team = self
            .registry
            .player_team(player)
            .ok_or(Rejection::NotInTeam)?;
        let session = self
            .registry
            .player(player)
            .ok_or(Rejection::PlayerNotFound)?;
        if session.lock().unwrap().mode() == PlayerMode::InRun {
            return Err(Rejection::CannotLeaveMidRun);
        }

        let team_id = team.lock().unwrap().id();
        self.ready.cancel_countdown(team_id);
        {
            let mut session = session.lock().unwrap();
            session.cancel_countdown();
            session.clear_ready();
        }
        self.registry.remove_player_from_team(player);

        self.notifier.notify(player, "team.left", "");
        if let Some(team) = self.registry.team(team_id) {
            for member in team.lock().unwrap().members() {
                self.notifier.notify(member, "team.member_left", "");
            }
        }
        Ok(())
    }

    /// Leader removes a member.
    pub fn kick(&self, leader: PlayerId, target: PlayerId) -> Result<(), Rejection> {
        let team = self
            .registry
            .player_team(leader)
            .ok_or(Rejection::NotInTeam)?;
        {
            let team = team.lock().unwrap();
            if !team.is_leader(leader) {
                return Err(Rejection::NotLeader);
            }
            if !team.is_member(target) {
                return Err(Rejection::PlayerNotFound);
            }
        }
        let team_id = team.lock().unwrap().id();
        self.ready.cancel_countdown(team_id);
        self.registry.remove_player_from_team(target);
        if let Some(session) = self.registry.player(target) {
            let mut session = session.lock().unwrap();
            session.cancel_countdown();
            session.clear_ready();
        }
        self.notifier.notify(target, "team.kicked", "");
        Ok(())
    }

    pub fn transfer_leadership(
        &self,
        leader: PlayerId,
        new_leader: PlayerId,
    ) -> Result<(), Rejection> {
        let team = self
            .registry
            .player_team(leader)
            .ok_or(Rejection::NotInTeam)?;
        let mut team = team.lock().unwrap();
        if !team.is_leader(leader) {
            return Err(Rejection::NotLeader);
        }
        if !team.transfer_leadership(new_leader) {
            return Err(Rejection::PlayerNotFound);
        }
        self.notifier.notify(new_leader, "team.leadership_received", "");
        Ok(())
    }

    /// Leader dissolves the whole team.
    pub fn disband(&self, leader: PlayerId) -> Result<(), Rejection> {
        let team = self
            .registry
            .player_team(leader)
            .ok_or(Rejection::NotInTeam)?;
        let (team_id, members) = {
            let team = team.lock().unwrap();
            if !team.is_leader(leader) {
                return Err(Rejection::NotLeader);
            }
            (team.id(), team.members())
        };
        self.ready.cancel_countdown(team_id);
        self.registry.disband_team(team_id);
        for member in members {
            self.notifier.notify(member, "team.disbanded", "");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use uuid::Uuid;

    use crate::notify::RecordingNotifier;

    struct Fixture {
        registry: Arc<StateRegistry>,
        party: PartyCoordinator,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(StateRegistry::new());
        let config = Arc::new(ServerConfig::default());
        let sink: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
        let ready = Arc::new(ReadyCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&sink),
            Arc::new(AtomicBool::new(true)),
        ));
        let party = PartyCoordinator::new(Arc::clone(&registry), config, sink, ready);
        Fixture { registry, party }
    }

    fn player(fx: &Fixture, name: &str) -> PlayerId {
        let id = Uuid::new_v4();
        fx.registry.get_or_create_player(id, name);
        id
    }

    #[test]
    fn invite_accept_flow() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        let bob = player(&fx, "Bob");

        fx.party.create(alice, "Nightwatch", now).unwrap();
        fx.party.invite(alice, bob, now).unwrap();
        let team_id = fx.party.accept_invite(bob, "Nightwatch", now).unwrap();

        let team = fx.registry.team(team_id).unwrap();
        assert!(team.lock().unwrap().is_member(bob));
        assert!(fx.registry.is_in_team(bob));
    }

    #[test]
    fn invite_guards() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        let bob = player(&fx, "Bob");
        let carol = player(&fx, "Carol");

        fx.party.create(alice, "Nightwatch", now).unwrap();
        assert_eq!(
            fx.party.invite(alice, alice, now).unwrap_err(),
            Rejection::CannotInviteSelf
        );
        // Only the leader can invite.
        fx.party.invite(alice, bob, now).unwrap();
        fx.party.accept_invite(bob, "Nightwatch", now).unwrap();
        assert_eq!(
            fx.party.invite(bob, carol, now).unwrap_err(),
            Rejection::NotLeader
        );
        // Someone already on a team cannot be invited.
        fx.party.create(carol, "Rivals", now).unwrap();
        assert_eq!(
            fx.party.invite(alice, carol, now).unwrap_err(),
            Rejection::TargetInTeam
        );
    }

    #[test]
    fn expired_invite_reads_as_absent() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        let bob = player(&fx, "Bob");
        fx.party.create(alice, "Nightwatch", now).unwrap();
        fx.party.invite(alice, bob, now).unwrap();

        let late = now + ServerConfig::default().invite_expiry();
        assert_eq!(
            fx.party.accept_invite(bob, "Nightwatch", late).unwrap_err(),
            Rejection::NoInvite
        );
    }

    #[test]
    fn team_size_is_capped() {
        let fx = fixture();
        let now = Instant::now();
        let leader = player(&fx, "Leader");
        fx.party.create(leader, "Full", now).unwrap();
        for i in 0..4 {
            let id = player(&fx, &format!("M{i}"));
            fx.party.invite(leader, id, now).unwrap();
            fx.party.accept_invite(id, "Full", now).unwrap();
        }
        // Default max size is 5, already reached.
        let extra = player(&fx, "Extra");
        assert_eq!(
            fx.party.invite(leader, extra, now).unwrap_err(),
            Rejection::TeamFull
        );
    }

    #[test]
    fn leave_mid_run_is_rejected() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        fx.party.create(alice, "Solo", now).unwrap();
        {
            let session = fx.registry.player(alice).unwrap();
            let mut session = session.lock().unwrap();
            session.begin_countdown();
            session.enter_run(Uuid::new_v4());
        }
        assert_eq!(
            fx.party.leave(alice).unwrap_err(),
            Rejection::CannotLeaveMidRun
        );
    }

    #[test]
    fn leader_leaving_hands_off_leadership() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        let bob = player(&fx, "Bob");
        let carol = player(&fx, "Carol");
        fx.party.create(alice, "Trio", now).unwrap();
        for id in [bob, carol] {
            fx.party.invite(alice, id, now).unwrap();
            fx.party.accept_invite(id, "Trio", now).unwrap();
        }

        fx.party.leave(alice).unwrap();

        let team = fx.registry.find_team_by_name("Trio").unwrap();
        let team = team.lock().unwrap();
        let leader = team.leader();
        assert!(leader == bob || leader == carol);
        assert_eq!(team.member_count(), 2);
    }

    #[test]
    fn kick_requires_leadership() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        let bob = player(&fx, "Bob");
        fx.party.create(alice, "Pair", now).unwrap();
        fx.party.invite(alice, bob, now).unwrap();
        fx.party.accept_invite(bob, "Pair", now).unwrap();

        assert_eq!(fx.party.kick(bob, alice).unwrap_err(), Rejection::NotLeader);
        fx.party.kick(alice, bob).unwrap();
        assert!(!fx.registry.is_in_team(bob));
    }

    #[test]
    fn transfer_then_disband() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        let bob = player(&fx, "Bob");
        fx.party.create(alice, "Pair", now).unwrap();
        fx.party.invite(alice, bob, now).unwrap();
        fx.party.accept_invite(bob, "Pair", now).unwrap();

        fx.party.transfer_leadership(alice, bob).unwrap();
        assert_eq!(
            fx.party.disband(alice).unwrap_err(),
            Rejection::NotLeader,
            "old leader lost the disband right"
        );
        fx.party.disband(bob).unwrap();
        assert!(fx.registry.find_team_by_name("Pair").is_none());
        assert!(!fx.registry.is_in_team(alice));
    }

    #[test]
    fn freed_team_name_is_reusable() {
        let fx = fixture();
        let now = Instant::now();
        let alice = player(&fx, "Alice");
        let bob = player(&fx, "Bob");
        fx.party.create(alice, "Nightwatch", now).unwrap();
        fx.party.leave(alice).unwrap();
        // Team disbanded with its last member; the name is free again.
        fx.party
            .create(bob, "Nightwatch", now + Duration::from_secs(1))
            .unwrap();
    }
}
