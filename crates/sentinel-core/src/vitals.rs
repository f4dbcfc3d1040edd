//! Player lives and post-hit invulnerability.

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HitOutcome {
    /// Player invulnerable or already out of lives.
    Ignored,
    /// A life was lost and an invulnerability window started.
    LifeLost { remaining: u32 },
    /// The last life was lost.
    Defeated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerVitals {
    lives: u32,
    starting_lives: u32,
    invulnerable: bool,
}

impl PlayerVitals {
    #[must_use]
    pub const fn new(lives: u32) -> Self {
        Self {
            lives,
            starting_lives: lives,
            invulnerable: false,
        }
    }

    #[must_use]
    pub const fn lives(&self) -> u32 {
        self.lives
    }

    #[must_use]
    pub const fn is_invulnerable(&self) -> bool {
        self.invulnerable
    }

    #[must_use]
    pub const fn is_defeated(&self) -> bool {
        self.lives == 0
    }

    /// Take one life unless shielded. The caller schedules
    /// [`end_invulnerability`](Self::end_invulnerability) for any non-ignored hit.
    pub fn deduct_life(&mut self) -> HitOutcome {
        if self.lives == 0 || self.invulnerable {
            return HitOutcome::Ignored;
        }
        self.invulnerable = true;
        self.lives -= 1;
        info!(lives = self.lives, "player hit");
        if self.lives == 0 {
            HitOutcome::Defeated
        } else {
            HitOutcome::LifeLost {
                remaining: self.lives,
            }
        }
    }

    pub fn end_invulnerability(&mut self) {
        self.invulnerable = false;
    }

    /// Restore the starting lives.
    pub fn reset(&mut self) {
        self.lives = self.starting_lives;
        self.invulnerable = false;
    }
}
