//! Session entity: two participant slots, the current position, and the
//! positions it can be rewound to.

use chesslink_core::{Color, PositionEngine, Role};
use std::fmt;
use std::time::Instant;
use tracing::info;

/// Server-assigned handle for one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity of a legacy anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairingKey {
    pub student: String,
    pub mentor: String,
}

impl PairingKey {
    pub fn new(student: impl Into<String>, mentor: impl Into<String>) -> Self {
        Self {
            student: student.into(),
            mentor: mentor.into(),
        }
    }
}

/// Where a session lives in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Legacy flow, keyed by the (student, mentor) username pair.
    Pairing(PairingKey),
    /// Named flow, keyed by an explicit session id.
    Named(String),
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Pairing(k) => write!(f, "{}/{}", k.student, k.mentor),
            SessionKey::Named(id) => write!(f, "#{id}"),
        }
    }
}

/// One occupant of a session slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub username: String,
    /// Connection currently animating this slot, if any.
    pub connection: Option<ConnectionId>,
    pub color: Color,
}

impl Participant {
    pub fn new(username: impl Into<String>, color: Color, connection: Option<ConnectionId>) -> Self {
        Self {
            username: username.into(),
            connection,
            color,
        }
    }
}

/// A paired mentor/student game with one authoritative position.
#[derive(Debug)]
pub struct Session<E> {
    key: SessionKey,
    student: Option<Participant>,
    mentor: Option<Participant>,
    position: E,
    history: Vec<E>,
    pub last_activity: Instant,
}

impl<E: PositionEngine> Session<E> {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            student: None,
            mentor: None,
            position: E::initial(),
            history: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn slot(&self, role: Role) -> Option<&Participant> {
        match role {
            Role::Student => self.student.as_ref(),
            Role::Mentor => self.mentor.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Participant> {
        match role {
            Role::Student => &mut self.student,
            Role::Mentor => &mut self.mentor,
        }
    }

    /// Place a participant into an empty or replaced slot.
    pub fn seat(&mut self, role: Role, participant: Participant) {
        *self.slot_mut(role) = Some(participant);
    }

    /// Bind `conn` to an already seated slot, returning the connection it
    /// replaces. No-op on an empty slot.
    pub fn bind(&mut self, role: Role, conn: ConnectionId) -> Option<ConnectionId> {
        let key = self.key.clone();
        let participant = self.slot_mut(role).as_mut()?;
        let replaced = participant.connection.replace(conn);
        info!(
            session = %key,
            role = %role,
            username = %participant.username,
            conn = %conn,
            replaced = ?replaced,
            "connection bound"
        );
        replaced
    }

    /// Clear `conn` from whichever slot holds it. Returns true if one did.
    pub fn unbind(&mut self, conn: ConnectionId) -> bool {
        let mut found = false;
        for slot in [&mut self.student, &mut self.mentor] {
            if let Some(p) = slot.as_mut() {
                if p.connection == Some(conn) {
                    p.connection = None;
                    found = true;
                }
            }
        }
        found
    }

    /// Slot animated by `conn`.
    pub fn role_of(&self, conn: ConnectionId) -> Option<Role> {
        [Role::Student, Role::Mentor]
            .into_iter()
            .find(|role| self.connection(*role) == Some(conn))
    }

    pub fn connection(&self, role: Role) -> Option<ConnectionId> {
        self.slot(role).and_then(|p| p.connection)
    }

    pub fn color(&self, role: Role) -> Option<Color> {
        self.slot(role).map(|p| p.color)
    }

    /// Every bound connection paired with its slot, student first.
    pub fn bound(&self) -> Vec<(Role, ConnectionId)> {
        [Role::Student, Role::Mentor]
            .into_iter()
            .filter_map(|role| self.connection(role).map(|conn| (role, conn)))
            .collect()
    }

    /// Both slots occupied.
    pub fn is_full(&self) -> bool {
        self.student.is_some() && self.mentor.is_some()
    }

    pub fn position(&self) -> &E {
        &self.position
    }

    pub fn notation(&self) -> String {
        self.position.notation()
    }

    /// Make `next` current, remembering the prior position.
    pub fn advance(&mut self, next: E) {
        let prior = std::mem::replace(&mut self.position, next);
        self.history.push(prior);
    }

    /// Restore the most recent prior position. False when there is none.
    pub fn rewind(&mut self) -> bool {
        match self.history.pop() {
            Some(prior) => {
                self.position = prior;
                true
            }
            None => false,
        }
    }

    /// Replace the position outright. The new position has no history.
    pub fn load(&mut self, position: E) {
        self.position = position;
        self.history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
