//! Position engine seam.
//!
//! The server never checks chess rules itself. It hands the current position
//! and a candidate move to a [`PositionEngine`], which either returns the new
//! position or rejects the move. Positions round-trip through a compact text
//! notation (FEN for the default [`ChessPosition`]).

use crate::error::{ChessLinkError, ChessLinkResult};
use chess::{Board, ChessMove, Piece, Rank, Square};
use std::fmt;
use std::str::FromStr;

/// A candidate move as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    /// Origin square, e.g. `e2`.
    pub from: String,
    /// Destination square, e.g. `e4`.
    pub to: String,
    /// Promotion piece letter. Queen is assumed when a pawn reaches the last
    /// rank without one.
    pub promotion: Option<String>,
}

impl MoveRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
        }
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(p) = &self.promotion {
            write!(f, "={p}")?;
        }
        Ok(())
    }
}

/// Legality checking, move application and text (de)serialization of a
/// board position.
///
/// Implementations are immutable values: [`PositionEngine::play`] returns a
/// new position and leaves `self` untouched, so callers can keep prior
/// positions around for undo.
pub trait PositionEngine: Clone + Send + Sync + 'static {
    /// The standard starting position.
    fn initial() -> Self;

    /// Parse a position from its text notation.
    fn parse(notation: &str) -> ChessLinkResult<Self>;

    /// Serialize the position to its text notation.
    fn notation(&self) -> String;

    /// Apply `mv` if it is legal for the side to move.
    fn play(&self, mv: &MoveRequest) -> Option<Self>;
}

/// Standard chess rules backed by the `chess` crate.
///
/// `chess::Board` has no move counters, so the halfmove clock and fullmove
/// number are tracked here and spliced back into the FEN.
#[derive(Clone)]
pub struct ChessPosition {
    board: Board,
    halfmove: u32,
    fullmove: u32,
}

impl ChessPosition {
    fn to_chess_move(&self, mv: &MoveRequest) -> Option<ChessMove> {
        let from = parse_square(&mv.from)?;
        let to = parse_square(&mv.to)?;

        let promotion = match mv.promotion.as_deref() {
            Some(letter) => Some(parse_promotion(letter)?),
            None => {
                let last_rank = matches!(to.get_rank(), Rank::First | Rank::Eighth);
                if last_rank && self.board.piece_on(from) == Some(Piece::Pawn) {
                    Some(Piece::Queen)
                } else {
                    None
                }
            }
        };

        Some(ChessMove::new(from, to, promotion))
    }
}

impl PositionEngine for ChessPosition {
    fn initial() -> Self {
        Self {
            board: Board::default(),
            halfmove: 0,
            fullmove: 1,
        }
    }

    fn parse(notation: &str) -> ChessLinkResult<Self> {
        let invalid = |detail: String| ChessLinkError::Position(format!("{notation:?}: {detail}"));
        let fields: Vec<&str> = notation.split_whitespace().collect();
        if fields.len() < 4 || fields.len() > 6 {
            return Err(invalid(format!("expected 4 to 6 FEN fields, got {}", fields.len())));
        }

        let board = Board::from_str(&format!("{} 0 1", fields[..4].join(" ")))
            .map_err(|e| invalid(format!("{e:?}")))?;
        let halfmove: u32 = match fields.get(4) {
            Some(f) => f
                .parse()
                .map_err(|_| invalid(format!("bad halfmove clock {f:?}")))?,
            None => 0,
        };
        let fullmove = match fields.get(5) {
            Some(f) => f
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| invalid(format!("bad fullmove number {f:?}")))?,
            None => 1,
        };

        Ok(Self {
            board,
            halfmove,
            fullmove,
        })
    }

    fn notation(&self) -> String {
        let fen = self.board.to_string();
        let placement: Vec<&str> = fen.split_whitespace().take(4).collect();
        format!("{} {} {}", placement.join(" "), self.halfmove, self.fullmove)
    }

    fn play(&self, mv: &MoveRequest) -> Option<Self> {
        let chess_move = self.to_chess_move(mv)?;
        if !self.board.legal(chess_move) {
            return None;
        }

        let resets_clock = self.board.piece_on(chess_move.get_source()) == Some(Piece::Pawn)
            || self.board.piece_on(chess_move.get_dest()).is_some();
        let black_moved = self.board.side_to_move() == chess::Color::Black;

        Some(Self {
            board: self.board.make_move_new(chess_move),
            halfmove: if resets_clock { 0 } else { self.halfmove + 1 },
            fullmove: if black_moved { self.fullmove + 1 } else { self.fullmove },
        })
    }
}

impl fmt::Debug for ChessPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChessPosition").field(&self.notation()).finish()
    }
}

fn parse_square(s: &str) -> Option<Square> {
    Square::from_str(&s.trim().to_ascii_lowercase()).ok()
}

fn parse_promotion(letter: &str) -> Option<Piece> {
    match letter.trim().to_ascii_lowercase().as_str() {
        "q" => Some(Piece::Queen),
        "r" => Some(Piece::Rook),
        "b" => Some(Piece::Bishop),
        "n" => Some(Piece::Knight),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_all(moves: &[(&str, &str)]) -> ChessPosition {
        moves.iter().fold(ChessPosition::initial(), |pos, (from, to)| {
            pos.play(&MoveRequest::new(*from, *to))
                .unwrap_or_else(|| panic!("{from}{to} should be legal"))
        })
    }

    #[test]
    fn initial_notation_round_trips() {
        let initial = ChessPosition::initial();
        let parsed = ChessPosition::parse(&initial.notation()).unwrap();
        assert_eq!(parsed.notation(), initial.notation());
        assert!(initial.notation().starts_with("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w"));
    }

    #[test]
    fn legal_move_changes_position() {
        let initial = ChessPosition::initial();
        let next = initial.play(&MoveRequest::new("e2", "e4")).unwrap();
        assert_ne!(next.notation(), initial.notation());
        assert!(next.notation().contains(" b "));
    }

    #[test]
    fn illegal_move_is_rejected() {
        let initial = ChessPosition::initial();
        assert!(initial.play(&MoveRequest::new("e2", "e5")).is_none());
        // Black cannot move first.
        assert!(initial.play(&MoveRequest::new("e7", "e5")).is_none());
    }

    #[test]
    fn malformed_squares_are_rejected() {
        let initial = ChessPosition::initial();
        assert!(initial.play(&MoveRequest::new("z9", "e4")).is_none());
        assert!(initial.play(&MoveRequest::new("", "")).is_none());
    }

    #[test]
    fn squares_are_case_insensitive() {
        let initial = ChessPosition::initial();
        assert!(initial.play(&MoveRequest::new("G1", "F3")).is_some());
    }

    #[test]
    fn castling_uses_king_squares() {
        let pos = play_all(&[
            ("e2", "e4"),
            ("e7", "e5"),
            ("g1", "f3"),
            ("b8", "c6"),
            ("f1", "c4"),
            ("g8", "f6"),
        ]);
        let castled = pos.play(&MoveRequest::new("e1", "g1")).unwrap();
        assert!(castled.notation().contains("RNBQ1RK1"));
    }

    #[test]
    fn promotion_defaults_to_queen() {
        let pos = ChessPosition::parse("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        let promoted = pos.play(&MoveRequest::new("a7", "a8")).unwrap();
        assert!(promoted.notation().starts_with("Q7/"));
    }

    #[test]
    fn explicit_underpromotion() {
        let pos = ChessPosition::parse("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        let mv = MoveRequest {
            from: "a7".into(),
            to: "a8".into(),
            promotion: Some("n".into()),
        };
        let promoted = pos.play(&mv).unwrap();
        assert!(promoted.notation().starts_with("N7/"));
    }

    #[test]
    fn move_counters_round_trip() {
        let fen = "4k3/8/8/8/8/8/8/4K2R w K - 7 42";
        assert_eq!(ChessPosition::parse(fen).unwrap().notation(), fen);
    }

    #[test]
    fn move_counters_advance() {
        let pos = play_all(&[("e2", "e4"), ("e7", "e5")]);
        assert!(pos.notation().ends_with(" 0 2"), "{}", pos.notation());

        let pos = play_all(&[("e2", "e4"), ("e7", "e5"), ("g1", "f3")]);
        assert!(pos.notation().ends_with(" 1 2"), "{}", pos.notation());

        let pos = play_all(&[("e2", "e4"), ("e7", "e5"), ("g1", "f3"), ("b8", "c6")]);
        assert!(pos.notation().ends_with(" 2 3"), "{}", pos.notation());
    }

    #[test]
    fn capture_resets_halfmove_clock() {
        let pos = ChessPosition::parse("4k3/8/8/8/8/8/r7/R3K3 w - - 9 30").unwrap();
        let next = pos.play(&MoveRequest::new("a1", "a2")).unwrap();
        assert!(next.notation().ends_with(" 0 30"), "{}", next.notation());
    }

    #[test]
    fn missing_counters_default() {
        let pos = ChessPosition::parse("4k3/8/8/8/8/8/8/4K3 w - -").unwrap();
        assert!(pos.notation().ends_with(" 0 1"));
    }

    #[test]
    fn bad_counters_are_rejected() {
        assert!(ChessPosition::parse("4k3/8/8/8/8/8/8/4K3 w - - x 1").is_err());
        assert!(ChessPosition::parse("4k3/8/8/8/8/8/8/4K3 w - - 0 0").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            ChessPosition::parse("not a position"),
            Err(ChessLinkError::Position(_))
        ));
    }

    #[test]
    fn move_request_display() {
        let mut mv = MoveRequest::new("a7", "a8");
        assert_eq!(mv.to_string(), "a7a8");
        mv.promotion = Some("q".into());
        assert_eq!(mv.to_string(), "a7a8=q");
    }
}
