//! Cache entry definitions.

use parking_lot::Mutex;

/// Outcome of matching a path against the hash list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Content and path matched a hash list record; the file behaves as absent.
    Hidden,
    /// No record matched; the file is passed through.
    Visible,
}

impl Verdict {
    /// Build a verdict from a match result.
    #[must_use]
    pub fn from_hidden(hidden: bool) -> Self {
        if hidden {
            Self::Hidden
        } else {
            Self::Visible
        }
    }

    /// True for [`Verdict::Hidden`].
    #[must_use]
    pub fn is_hidden(self) -> bool {
        matches!(self, Self::Hidden)
    }
}

/// Per-path cell holding a verdict once it has been computed.
///
/// The cell's lock is held for the whole hashing pass, so concurrent first
/// lookups of the same path wait for one computation instead of repeating it.
#[derive(Debug, Default)]
pub struct VerdictSlot {
    verdict: Mutex<Option<Verdict>>,
}

impl VerdictSlot {
    /// Stored verdict, if any.
    #[must_use]
    pub fn get(&self) -> Option<Verdict> {
        *self.verdict.lock()
    }

    /// Return the stored verdict or run `compute` while holding the slot.
    ///
    /// A successful result is stored for good. Errors are never stored, so
    /// the next caller retries.
    pub fn get_or_try_compute<E>(
        &self,
        compute: impl FnOnce() -> Result<Verdict, E>,
    ) -> Result<Verdict, E> {
        let mut guard = self.verdict.lock();
        if let Some(verdict) = *guard {
            return Ok(verdict);
        }
        let verdict = compute()?;
        *guard = Some(verdict);
        Ok(verdict)
    }
}
