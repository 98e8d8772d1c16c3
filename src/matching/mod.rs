//! Cross-side match state and everything that edits it.

pub mod auto;
pub mod ops;
pub mod records;
pub mod status;
mod table;

pub use self::auto::AutoMatcher;
pub use self::ops::MatchState;
pub use self::records::{MatchRecord, apply_match_records, match_records};
pub use self::status::{KindStatus, MatchStatus};
pub use self::table::{Links, MatchEntity, MatchTable};
