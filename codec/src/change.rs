//! Per-object change tracking.
//!
//! A tracker moves `Clean -> Partial -> Full`. `Full` absorbs further marks
//! and only [`ChangeTracker::clear`] returns an object to `Clean`.

use schema::FieldId;

/// Number of distinct changed fields tracked before escalating to `Full`.
pub const CHANGE_SET_CAPACITY: usize = 20;

/// Coarse state of a [`ChangeTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    Clean,
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracked {
    Clean,
    Partial { mask: [u64; 4], count: u8 },
    Full,
}

/// The set of fields of one object written since the last snapshot reset.
///
/// The partial set is a 256-bit mask indexed by field id, so membership and
/// insertion are O(1) and iteration yields ids in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeTracker {
    tracked: Tracked,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTracker {
    /// A tracker for a newly created object: everything must be sent.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tracked: Tracked::Full,
        }
    }

    #[must_use]
    pub const fn clean() -> Self {
        Self {
            tracked: Tracked::Clean,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ChangeState {
        match self.tracked {
            Tracked::Clean => ChangeState::Clean,
            Tracked::Partial { .. } => ChangeState::Partial,
            Tracked::Full => ChangeState::Full,
        }
    }

    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self.tracked, Tracked::Clean)
    }

    #[must_use]
    pub const fn is_fully_changed(&self) -> bool {
        matches!(self.tracked, Tracked::Full)
    }

    /// Records a write to `field`.
    ///
    /// Marking the `CHANGE_SET_CAPACITY + 1`th distinct field escalates to `Full`.
    pub fn mark_changed(&mut self, field: FieldId) {
        let (word, bit) = slot(field);
        self.tracked = match self.tracked {
            Tracked::Full => Tracked::Full,
            Tracked::Clean => {
                let mut mask = [0u64; 4];
                mask[word] |= bit;
                Tracked::Partial { mask, count: 1 }
            }
            Tracked::Partial { mut mask, count } => {
                if mask[word] & bit != 0 {
                    return;
                }
                if usize::from(count) >= CHANGE_SET_CAPACITY {
                    Tracked::Full
                } else {
                    mask[word] |= bit;
                    Tracked::Partial {
                        mask,
                        count: count + 1,
                    }
                }
            }
        };
    }

    /// Forces the whole object to be sent.
    pub fn mark_fully_changed(&mut self) {
        self.tracked = Tracked::Full;
    }

    pub fn clear(&mut self) {
        self.tracked = Tracked::Clean;
    }

    /// Number of fields the next delta will carry for a class of `field_count` fields.
    #[must_use]
    pub fn changed_count(&self, field_count: usize) -> usize {
        match self.tracked {
            Tracked::Clean => 0,
            Tracked::Partial { .. } => self.changed_fields(field_count).count(),
            Tracked::Full => field_count,
        }
    }

    /// Changed field ids in schema order.
    ///
    /// `Full` yields every id below `field_count`; `Partial` yields the recorded ids.
    #[must_use]
    pub fn changed_fields(&self, field_count: usize) -> ChangedFields {
        let end = field_count.min(256) as u16;
        match self.tracked {
            Tracked::Clean => ChangedFields {
                mask: [0; 4],
                next: 0,
                end: 0,
            },
            Tracked::Partial { mask, .. } => ChangedFields { mask, next: 0, end },
            Tracked::Full => ChangedFields {
                mask: [u64::MAX; 4],
                next: 0,
                end,
            },
        }
    }
}

fn slot(field: FieldId) -> (usize, u64) {
    let index = field.index();
    (index / 64, 1u64 << (index % 64))
}

/// Iterator over changed field ids, see [`ChangeTracker::changed_fields`].
#[derive(Debug, Clone)]
pub struct ChangedFields {
    mask: [u64; 4],
    next: u16,
    end: u16,
}

impl Iterator for ChangedFields {
    type Item = FieldId;

    fn next(&mut self) -> Option<FieldId> {
        while self.next < self.end {
            let index = self.next;
            self.next += 1;
            let word = usize::from(index / 64);
            if self.mask[word] & (1u64 << (index % 64)) != 0 {
                return Some(FieldId::new(index as u8));
            }
        }
        None
    }
}
