use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::ids::{PlayerId, RunId, TeamId};

/// A party of players that queues and runs together.
///
/// Holds membership, per-member readiness, per-member disconnect stamps,
/// pending invites, and the leadership pointer. The struct itself is plain
/// data; the registry wraps each team in its own mutex, so methods here are
/// written to be idempotent and order-independent rather than transactional
/// (`mark_dead` twice, `remove_invite` on an absent invitee, etc. are
/// no-ops, not errors).
#[derive(Debug, Clone)]
pub struct Team {
    id: TeamId,
    pub name: String,
    leader: PlayerId,
    members: HashSet<PlayerId>,
    ready: HashSet<PlayerId>,
    disconnected: HashMap<PlayerId, Instant>,
    invites: HashMap<PlayerId, Instant>,
    pub run_id: Option<RunId>,
    created_at: Instant,
}

impl Team {
    /// Creates a team with the founding player as sole member and leader.
    pub fn new(id: TeamId, name: impl Into<String>, leader: PlayerId, now: Instant) -> Self {
        let mut members = HashSet::new();
        members.insert(leader);
        Self {
            id,
            name: name.into(),
            leader,
            members,
            ready: HashSet::new(),
            disconnected: HashMap::new(),
            invites: HashMap::new(),
            run_id: None,
            created_at: now,
        }
    }

    pub fn id(&self) -> TeamId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    // ==================== Membership ====================

    pub fn add_member(&mut self, player: PlayerId) -> bool {
        self.members.insert(player)
    }

    /// Removes a member from every collection. Leadership is NOT reassigned
    /// here; callers that remove the leader must follow up with
    /// `auto_select_leader` or disband (the registry does).
    pub fn remove_member(&mut self, player: PlayerId) -> bool {
        self.ready.remove(&player);
        self.disconnected.remove(&player);
        self.members.remove(&player)
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    pub fn members(&self) -> Vec<PlayerId> {
        self.members.iter().copied().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    // ==================== Readiness ====================

    pub fn set_ready(&mut self, player: PlayerId, ready: bool) {
        if ready {
            if self.members.contains(&player) {
                self.ready.insert(player);
            }
        } else {
            self.ready.remove(&player);
        }
    }

    pub fn is_ready(&self, player: PlayerId) -> bool {
        self.ready.contains(&player)
    }

    /// True when every current member is ready (a ready singleton counts).
    pub fn is_all_ready(&self) -> bool {
        self.members.iter().all(|m| self.ready.contains(m))
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn clear_ready(&mut self) {
        self.ready.clear();
    }

    // ==================== Disconnect tracking ====================

    /// Idempotent: repeated marks keep the first disconnect instant, so a
    /// flapping connection cannot stretch its own grace window.
    pub fn mark_disconnected(&mut self, player: PlayerId, now: Instant) {
        if self.members.contains(&player) {
            self.disconnected.entry(player).or_insert(now);
        }
    }

    pub fn mark_reconnected(&mut self, player: PlayerId) {
        self.disconnected.remove(&player);
    }

    pub fn is_disconnected(&self, player: PlayerId) -> bool {
        self.disconnected.contains_key(&player)
    }

    pub fn disconnected_members(&self) -> Vec<PlayerId> {
        self.disconnected.keys().copied().collect()
    }

    /// Drops every member whose grace window has elapsed from all team
    /// collections and returns them. This is how a team shrinks due to
    /// abandonment.
    pub fn purge_expired_disconnects(&mut self, grace: Duration, now: Instant) -> Vec<PlayerId> {
        let expired: Vec<PlayerId> = self
            .disconnected
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) >= grace)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.disconnected.remove(id);
            self.members.remove(id);
            self.ready.remove(id);
        }
        expired
    }

    /// True iff no member is alive-and-connected-or-within-grace: every
    /// member is either missing from `alive`, or alive but disconnected for
    /// at least `grace`. Pure — safe to call speculatively from any path.
    pub fn is_wiped(&self, alive: &HashSet<PlayerId>, grace: Duration, now: Instant) -> bool {
        for member in &self.members {
            if alive.contains(member) {
                match self.disconnected.get(member) {
                    None => return false,
                    Some(at) if now.saturating_duration_since(*at) < grace => return false,
                    Some(_) => {},
                }
            }
        }
        true
    }

    pub fn connected_count(&self) -> usize {
        self.members.len() - self.disconnected.len()
    }

    // ==================== Invites ====================

    pub fn add_invite(&mut self, player: PlayerId, expires_at: Instant) {
        self.invites.insert(player, expires_at);
    }

    /// Validity is evaluated lazily at point of use; the expiry instant
    /// itself already counts as expired. An expired entry is removed here,
    /// so no background sweep is needed for invites.
    pub fn has_invite(&mut self, player: PlayerId, now: Instant) -> bool {
        match self.invites.get(&player) {
            None => false,
            Some(expires_at) if now >= *expires_at => {
                self.invites.remove(&player);
                false
            },
            Some(_) => true,
        }
    }

    pub fn remove_invite(&mut self, player: PlayerId) {
        self.invites.remove(&player);
    }

    pub fn clear_expired_invites(&mut self, now: Instant) {
        self.invites.retain(|_, expires_at| now < *expires_at);
    }

    pub fn pending_invites(&mut self, now: Instant) -> Vec<PlayerId> {
        self.clear_expired_invites(now);
        self.invites.keys().copied().collect()
    }

    // ==================== Leadership ====================

    pub fn leader(&self) -> PlayerId {
        self.leader
    }

    pub fn is_leader(&self, player: PlayerId) -> bool {
        self.leader == player
    }

    /// Fails without mutation when the target is not a current member.
    pub fn transfer_leadership(&mut self, new_leader: PlayerId) -> bool {
        if !self.members.contains(&new_leader) {
            return false;
        }
        self.leader = new_leader;
        true
    }

    /// Picks a new leader, preferring a connected member and falling back
    /// to anyone left. `None` only when the team is empty.
    pub fn auto_select_leader(&mut self) -> Option<PlayerId> {
        let pick = self
            .members
            .iter()
            .find(|m| !self.disconnected.contains_key(*m))
            .or_else(|| self.members.iter().next())
            .copied()?;
        self.leader = pick;
        Some(pick)
    }

    // ==================== Run binding ====================

    /// Clears readiness, disconnect stamps, and the run binding once a run
    /// has ended.
    pub fn reset_for_new_run(&mut self) {
        self.ready.clear();
        self.disconnected.clear();
        self.run_id = None;
    }
}
