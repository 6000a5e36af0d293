// PGN move counting

use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use shakmaty::{fen::Fen, CastlingMode, Chess, Position};

/// Replays the mainline, yielding the number of half-moves or `None` if
/// the game could not be replayed.
struct MoveCounter {
    pos: Chess,
    half_moves: usize,
    failed: bool,
}

impl MoveCounter {
    fn new() -> Self {
        Self {
            pos: Chess::default(),
            half_moves: 0,
            failed: false,
        }
    }
}

impl Visitor for MoveCounter {
    type Result = Option<usize>;

    fn begin_game(&mut self) {
        self.pos = Chess::default();
        self.half_moves = 0;
        self.failed = false;
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        if key == b"FEN" {
            let pos = Fen::from_ascii(value.as_bytes())
                .ok()
                .and_then(|fen| fen.into_position::<Chess>(CastlingMode::Chess960).ok());
            match pos {
                Some(pos) => self.pos = pos,
                None => self.failed = true,
            }
        }
    }

    fn end_headers(&mut self) -> Skip {
        Skip(self.failed)
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.failed {
            return;
        }
        match san_plus.san.to_move(&self.pos) {
            Ok(m) => {
                self.pos.play_unchecked(&m);
                self.half_moves += 1;
            }
            Err(_) => self.failed = true,
        }
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true) // mainline only
    }

    fn end_game(&mut self) -> Self::Result {
        if self.failed {
            None
        } else {
            Some(self.half_moves)
        }
    }
}

/// Number of full moves played in a PGN game.
///
/// Malformed input, illegal moves and empty games all count as `0`.
pub fn count_moves(pgn: &str) -> i64 {
    let mut reader = BufferedReader::new_cursor(pgn.as_bytes());
    let mut counter = MoveCounter::new();

    match reader.read_game(&mut counter) {
        Ok(Some(Some(half_moves))) => ((half_moves + 1) / 2) as i64,
        _ => 0,
    }
}
