//! Session registry.
//!
//! Holds the legacy pairing sessions (matched by username) and the named
//! sessions (matched by id) behind one interface. Every in-flight event is
//! attributed to a session by scanning both stores for the sender's
//! connection.

use super::state::{ConnectionId, PairingKey, Participant, Session, SessionKey};
use chesslink_core::{ChessLinkError, ChessLinkResult, ChessPosition, PositionEngine, Role};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How `newgame` decides that a legacy session already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Student name or mentor name matches.
    #[default]
    Either,
    /// Both names match.
    Both,
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "either" => Ok(MatchPolicy::Either),
            "both" => Ok(MatchPolicy::Both),
            other => Err(format!("unknown match policy '{other}' (expected either|both)")),
        }
    }
}

impl MatchPolicy {
    fn matches(self, key: &PairingKey, student: &str, mentor: &str) -> bool {
        match self {
            MatchPolicy::Either => key.student == student || key.mentor == mentor,
            MatchPolicy::Both => key.student == student && key.mentor == mentor,
        }
    }
}

/// Outcome of [`SessionRegistry::resolve_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created,
    Existing,
}

/// In-memory store of every active session.
pub struct SessionRegistry<E = ChessPosition> {
    pairings: Vec<Session<E>>,
    named: HashMap<String, Session<E>>,
    match_policy: MatchPolicy,
    max_sessions: usize,
}

impl<E: PositionEngine> Default for SessionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PositionEngine> SessionRegistry<E> {
    /// Create an empty registry with no session limit.
    pub fn new() -> Self {
        Self::with_limits(MatchPolicy::default(), usize::MAX)
    }

    pub fn with_limits(match_policy: MatchPolicy, max_sessions: usize) -> Self {
        Self {
            pairings: Vec::new(),
            named: HashMap::new(),
            match_policy,
            max_sessions,
        }
    }

    /// Legacy `newgame` flow.
    ///
    /// Returns the matching session with `conn` rebound into the `role` slot,
    /// or creates a session with both participants seated and only the
    /// requester's slot bound.
    pub fn resolve_or_create(
        &mut self,
        student: &str,
        mentor: &str,
        role: Role,
        conn: ConnectionId,
    ) -> ChessLinkResult<(&mut Session<E>, Resolution)> {
        let policy = self.match_policy;
        let existing = self.pairings.iter().position(|s| match s.key() {
            SessionKey::Pairing(key) => policy.matches(key, student, mentor),
            SessionKey::Named(_) => false,
        });

        if let Some(idx) = existing {
            self.release(conn);
            let session = &mut self.pairings[idx];
            session.bind(role, conn);
            session.touch();
            debug!(session = %session.key(), role = %role, "newgame joined existing session");
            return Ok((session, Resolution::Existing));
        }

        self.ensure_capacity()?;
        self.release(conn);

        let own = role.creator_color();
        let (student_color, mentor_color) = match role {
            Role::Student => (own, own.complement()),
            Role::Mentor => (own.complement(), own),
        };
        let (student_conn, mentor_conn) = match role {
            Role::Student => (Some(conn), None),
            Role::Mentor => (None, Some(conn)),
        };

        let key = PairingKey::new(student, mentor);
        let mut session = Session::new(SessionKey::Pairing(key));
        session.seat(Role::Student, Participant::new(student, student_color, student_conn));
        session.seat(Role::Mentor, Participant::new(mentor, mentor_color, mentor_conn));
        info!(session = %session.key(), role = %role, conn = %conn, "pairing session created");

        self.pairings.push(session);
        let idx = self.pairings.len() - 1;
        Ok((&mut self.pairings[idx], Resolution::Created))
    }

    /// Create a named session with the requester seated in `role`.
    pub fn create_named(
        &mut self,
        session_id: &str,
        username: &str,
        role: Role,
        conn: ConnectionId,
    ) -> ChessLinkResult<&mut Session<E>> {
        if self.named.contains_key(session_id) {
            warn!(session_id, username, "duplicate session id");
            return Err(ChessLinkError::SessionExists(session_id.to_string()));
        }
        self.ensure_capacity()?;
        self.release(conn);

        let mut session = Session::new(SessionKey::Named(session_id.to_string()));
        session.seat(role, Participant::new(username, role.creator_color(), Some(conn)));
        info!(session_id, username, role = %role, conn = %conn, "named session created");

        Ok(self.named.entry(session_id.to_string()).or_insert(session))
    }

    /// Join a named session. A slot already held by the same username is
    /// rebound (reconnect); held by anyone else it is `RoleTaken`.
    pub fn join_named(
        &mut self,
        session_id: &str,
        username: &str,
        role: Role,
        conn: ConnectionId,
    ) -> ChessLinkResult<&mut Session<E>> {
        let session = self
            .named
            .get(session_id)
            .ok_or_else(|| ChessLinkError::SessionNotFound(session_id.to_string()))?;

        let rejoin = match session.slot(role) {
            Some(occupant) if occupant.username == username => true,
            Some(_) => {
                warn!(session_id, username, role = %role, "role already taken");
                return Err(ChessLinkError::RoleTaken {
                    session: session_id.to_string(),
                    role,
                });
            }
            None => false,
        };
        let color = session
            .color(role.other())
            .map(|c| c.complement())
            .unwrap_or_else(|| role.creator_color());

        self.release(conn);
        let session = self
            .named
            .get_mut(session_id)
            .ok_or_else(|| ChessLinkError::SessionNotFound(session_id.to_string()))?;

        if rejoin {
            session.bind(role, conn);
        } else {
            session.seat(role, Participant::new(username, color, Some(conn)));
            info!(session_id, username, role = %role, conn = %conn, "joined named session");
        }
        session.touch();
        Ok(session)
    }

    /// Find the session and slot `conn` is bound to.
    pub fn find_by_connection(&mut self, conn: ConnectionId) -> Option<(&mut Session<E>, Role)> {
        self.pairings
            .iter_mut()
            .chain(self.named.values_mut())
            .find_map(|s| s.role_of(conn).map(|role| (s, role)))
    }

    pub fn find_by_id(&self, session_id: &str) -> Option<&Session<E>> {
        self.named.get(session_id)
    }

    /// Legacy session with exactly this username pair.
    pub fn find_pairing(&self, student: &str, mentor: &str) -> Option<&Session<E>> {
        self.pairings.iter().find(|s| match s.key() {
            SessionKey::Pairing(key) => key.student == student && key.mentor == mentor,
            SessionKey::Named(_) => false,
        })
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session<E>> {
        match key {
            SessionKey::Pairing(k) => self.find_pairing(&k.student, &k.mentor),
            SessionKey::Named(id) => self.find_by_id(id),
        }
    }

    /// Remove a session. Callers notify bound connections first.
    pub fn destroy(&mut self, key: &SessionKey) -> Option<Session<E>> {
        let removed = match key {
            SessionKey::Pairing(_) => {
                let idx = self.pairings.iter().position(|s| s.key() == key)?;
                Some(self.pairings.swap_remove(idx))
            }
            SessionKey::Named(id) => self.named.remove(id),
        };
        if removed.is_some() {
            info!(session = %key, "session destroyed");
        }
        removed
    }

    /// Remove sessions idle for at least `max_idle`, returning them.
    pub fn gc(&mut self, max_idle: Duration) -> Vec<Session<E>> {
        let mut removed = Vec::new();

        let mut kept = Vec::with_capacity(self.pairings.len());
        for session in self.pairings.drain(..) {
            if session.last_activity.elapsed() >= max_idle {
                removed.push(session);
            } else {
                kept.push(session);
            }
        }
        self.pairings = kept;

        let expired: Vec<String> = self
            .named
            .iter()
            .filter(|(_, s)| s.last_activity.elapsed() >= max_idle)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(session) = self.named.remove(&id) {
                removed.push(session);
            }
        }

        for session in &removed {
            warn!(session = %session.key(), idle_secs = session.last_activity.elapsed().as_secs(), "session expired (idle)");
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "GC removed sessions");
        }
        removed
    }

    /// Number of sessions across both stores.
    pub fn len(&self) -> usize {
        self.pairings.len() + self.named.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_capacity(&self) -> ChessLinkResult<()> {
        if self.len() >= self.max_sessions {
            return Err(ChessLinkError::Capacity(self.max_sessions));
        }
        Ok(())
    }

    /// A connection animates at most one slot: drop it from wherever it is
    /// bound before binding it somewhere new.
    fn release(&mut self, conn: ConnectionId) {
        for session in self.pairings.iter_mut().chain(self.named.values_mut()) {
            if session.unbind(conn) {
                debug!(session = %session.key(), conn = %conn, "connection released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chesslink_core::{Color, MoveRequest};

    const A: ConnectionId = ConnectionId(1);
    const B: ConnectionId = ConnectionId(2);
    const C: ConnectionId = ConnectionId(3);

    fn registry() -> SessionRegistry<ChessPosition> {
        SessionRegistry::new()
    }

    #[test]
    fn match_policy_from_str() {
        assert_eq!("either".parse::<MatchPolicy>(), Ok(MatchPolicy::Either));
        assert_eq!("BOTH".parse::<MatchPolicy>(), Ok(MatchPolicy::Both));
        assert!("any".parse::<MatchPolicy>().is_err());
    }

    #[test]
    fn newgame_creates_session_with_student_dark() {
        let mut reg = registry();
        let (session, res) = reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        assert_eq!(res, Resolution::Created);
        assert_eq!(session.color(Role::Student), Some(Color::Dark));
        assert_eq!(session.color(Role::Mentor), Some(Color::Light));
        assert_eq!(session.connection(Role::Student), Some(A));
        assert_eq!(session.connection(Role::Mentor), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn newgame_created_by_mentor() {
        let mut reg = registry();
        let (session, _) = reg.resolve_or_create("Alice", "Bob", Role::Mentor, A).unwrap();
        assert_eq!(session.color(Role::Mentor), Some(Color::Light));
        assert_eq!(session.color(Role::Student), Some(Color::Dark));
        assert_eq!(session.connection(Role::Mentor), Some(A));
    }

    #[test]
    fn second_newgame_binds_into_same_session() {
        let mut reg = registry();
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        let (session, res) = reg.resolve_or_create("Alice", "Bob", Role::Mentor, B).unwrap();
        assert_eq!(res, Resolution::Existing);
        assert_eq!(session.connection(Role::Mentor), Some(B));
        assert_eq!(session.connection(Role::Student), Some(A));
        assert_eq!(session.color(Role::Mentor), Some(Color::Light));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn either_policy_matches_on_one_name() {
        let mut reg = registry();
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        let (_, res) = reg.resolve_or_create("Alice", "Carol", Role::Mentor, B).unwrap();
        assert_eq!(res, Resolution::Existing);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn both_policy_requires_exact_pair() {
        let mut reg: SessionRegistry<ChessPosition> =
            SessionRegistry::with_limits(MatchPolicy::Both, 10);
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        let (_, res) = reg.resolve_or_create("Alice", "Carol", Role::Mentor, B).unwrap();
        assert_eq!(res, Resolution::Created);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn reconnect_rebinds_slot() {
        let mut reg = registry();
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        reg.resolve_or_create("Alice", "Bob", Role::Student, C).unwrap();
        assert!(reg.find_by_connection(A).is_none());
        let (_, role) = reg.find_by_connection(C).unwrap();
        assert_eq!(role, Role::Student);
    }

    #[test]
    fn create_named_assigns_color_from_role() {
        let mut reg = registry();
        let s = reg.create_named("abc", "Bob", Role::Mentor, A).unwrap();
        assert_eq!(s.color(Role::Mentor), Some(Color::Light));
        assert!(s.slot(Role::Student).is_none());

        let s = reg.create_named("xyz", "Alice", Role::Student, B).unwrap();
        assert_eq!(s.color(Role::Student), Some(Color::Dark));
    }

    #[test]
    fn duplicate_named_session_is_rejected_without_mutation() {
        let mut reg = registry();
        {
            let s = reg.create_named("abc", "Bob", Role::Mentor, A).unwrap();
            let next = s.position().play(&MoveRequest::new("e2", "e4")).unwrap();
            s.advance(next);
        }
        let before = reg.find_by_id("abc").unwrap().notation();

        let err = reg.create_named("abc", "Eve", Role::Student, B);
        assert!(matches!(err, Err(ChessLinkError::SessionExists(_))));

        let s = reg.find_by_id("abc").unwrap();
        assert_eq!(s.notation(), before);
        assert_eq!(s.history_len(), 1);
        assert_eq!(s.connection(Role::Mentor), Some(A));
        assert!(s.slot(Role::Student).is_none());
        assert!(reg.find_by_connection(B).is_none());
    }

    #[test]
    fn join_named_fills_counterpart() {
        let mut reg = registry();
        reg.create_named("abc", "Bob", Role::Mentor, A).unwrap();
        let s = reg.join_named("abc", "Alice", Role::Student, B).unwrap();
        assert!(s.is_full());
        assert_eq!(s.color(Role::Student), Some(Color::Dark));
        assert_eq!(s.connection(Role::Student), Some(B));
    }

    #[test]
    fn join_unknown_session_fails() {
        let mut reg = registry();
        let err = reg.join_named("nope", "Alice", Role::Student, B);
        assert!(matches!(err, Err(ChessLinkError::SessionNotFound(_))));
    }

    #[test]
    fn join_taken_role_fails_without_mutation() {
        let mut reg = registry();
        reg.create_named("abc", "Bob", Role::Mentor, A).unwrap();
        reg.join_named("abc", "Alice", Role::Student, B).unwrap();

        let err = reg.join_named("abc", "Eve", Role::Student, C);
        assert!(matches!(err, Err(ChessLinkError::RoleTaken { role: Role::Student, .. })));

        let s = reg.find_by_id("abc").unwrap();
        assert_eq!(s.slot(Role::Student).unwrap().username, "Alice");
        assert_eq!(s.connection(Role::Student), Some(B));
        assert_eq!(s.slot(Role::Mentor).unwrap().username, "Bob");
        assert_eq!(s.connection(Role::Mentor), Some(A));
    }

    #[test]
    fn join_same_username_rebinds() {
        let mut reg = registry();
        reg.create_named("abc", "Bob", Role::Mentor, A).unwrap();
        let s = reg.join_named("abc", "Bob", Role::Mentor, C).unwrap();
        assert_eq!(s.connection(Role::Mentor), Some(C));
        assert_eq!(s.color(Role::Mentor), Some(Color::Light));
        assert!(reg.find_by_connection(A).is_none());
    }

    #[test]
    fn find_by_connection_scans_both_stores() {
        let mut reg = registry();
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        reg.create_named("abc", "Carol", Role::Mentor, B).unwrap();

        let (s, role) = reg.find_by_connection(B).unwrap();
        assert_eq!(s.key(), &SessionKey::Named("abc".into()));
        assert_eq!(role, Role::Mentor);

        let (s, role) = reg.find_by_connection(A).unwrap();
        assert_eq!(s.key(), &SessionKey::Pairing(PairingKey::new("Alice", "Bob")));
        assert_eq!(role, Role::Student);

        assert!(reg.find_by_connection(C).is_none());
    }

    #[test]
    fn connection_moves_between_sessions() {
        let mut reg = registry();
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        reg.create_named("abc", "Alice", Role::Student, A).unwrap();

        let (s, _) = reg.find_by_connection(A).unwrap();
        assert_eq!(s.key(), &SessionKey::Named("abc".into()));
        let legacy = reg.find_pairing("Alice", "Bob").unwrap();
        assert_eq!(legacy.connection(Role::Student), None);
    }

    #[test]
    fn destroy_removes_from_store() {
        let mut reg = registry();
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        reg.create_named("abc", "Carol", Role::Mentor, B).unwrap();

        let key = SessionKey::Pairing(PairingKey::new("Alice", "Bob"));
        assert!(reg.destroy(&key).is_some());
        assert!(reg.destroy(&key).is_none());
        assert!(reg.destroy(&SessionKey::Named("abc".into())).is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn capacity_limits_creation() {
        let mut reg: SessionRegistry<ChessPosition> =
            SessionRegistry::with_limits(MatchPolicy::Either, 1);
        reg.create_named("abc", "Bob", Role::Mentor, A).unwrap();
        assert!(matches!(
            reg.create_named("def", "Eve", Role::Mentor, B),
            Err(ChessLinkError::Capacity(1))
        ));
        assert!(matches!(
            reg.resolve_or_create("Alice", "Bob", Role::Student, C),
            Err(ChessLinkError::Capacity(1))
        ));
        // Joining does not create, so it is unaffected.
        assert!(reg.join_named("abc", "Alice", Role::Student, C).is_ok());
    }

    #[test]
    fn gc_removes_idle_sessions() {
        let mut reg = registry();
        reg.resolve_or_create("Alice", "Bob", Role::Student, A).unwrap();
        reg.create_named("abc", "Carol", Role::Mentor, B).unwrap();

        assert!(reg.gc(Duration::from_secs(3600)).is_empty());
        assert_eq!(reg.len(), 2);

        let removed = reg.gc(Duration::ZERO);
        assert_eq!(removed.len(), 2);
        assert!(reg.is_empty());
    }
}
