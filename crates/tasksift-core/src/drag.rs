//! Drag-to-reorder gesture state machine.
//!
//! The machine knows nothing about widgets: callers pass the current layout of
//! the list on every event and apply the emitted [`Swap`]s to their model. Keys
//! identify items across swaps, so the layout may be rebuilt between events.

/// Fraction of an item's size the leading edge must travel past its midpoint
/// before the item counts as crossed.
pub const HYSTERESIS_FRACTION: f32 = 0.1;

/// Position of one item along the drag axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemBounds<K> {
    /// Stable item key.
    pub key: K,
    /// Position in the list.
    pub index: usize,
    /// Leading coordinate (top).
    pub offset: f32,
    /// Extent along the axis.
    pub size: f32,
}

impl<K> ItemBounds<K> {
    /// Whether coordinate `y` falls inside the item.
    #[must_use]
    pub fn contains(&self, y: f32) -> bool {
        y >= self.offset && y < self.offset + self.size
    }

    fn down_threshold(&self) -> f32 {
        self.size.mul_add(0.5 + HYSTERESIS_FRACTION, self.offset)
    }

    fn up_threshold(&self) -> f32 {
        self.size.mul_add(0.5 - HYSTERESIS_FRACTION, self.offset)
    }
}

/// Strictly positive, finite length.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ItemSize(f32);

impl ItemSize {
    /// `None` unless `value` is finite and greater than zero.
    #[must_use]
    pub fn new(value: f32) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    /// The length.
    #[must_use]
    pub const fn get(self) -> f32 {
        self.0
    }
}

/// Reorder request: move the item at `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swap {
    /// Current index of the dragged item.
    pub from: usize,
    /// Index of the item it was dragged past.
    pub to: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Data held while an item is being dragged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession<K> {
    dragged: K,
    tracked: K,
    initial_offset: f32,
    size: ItemSize,
    displacement: f32,
    direction: Option<Direction>,
}

impl<K: Copy + PartialEq> DragSession<K> {
    /// Key of the item under the pointer.
    #[must_use]
    pub const fn dragged(&self) -> K {
        self.dragged
    }

    /// Key of the last item a swap was emitted against.
    #[must_use]
    pub const fn tracked(&self) -> K {
        self.tracked
    }

    /// Accumulated pointer travel since the drag started.
    #[must_use]
    pub const fn displacement(&self) -> f32 {
        self.displacement
    }

    fn projected_top(&self) -> f32 {
        self.initial_offset + self.displacement
    }

    fn target<'a>(&self, from: usize, layout: &'a [ItemBounds<K>]) -> Option<&'a ItemBounds<K>> {
        let top = self.projected_top();
        let bottom = top + self.size.get();
        match self.direction? {
            Direction::Down => layout
                .iter()
                .filter(|item| item.index > from && bottom >= item.down_threshold())
                .max_by_key(|item| item.index),
            Direction::Up => layout
                .iter()
                .filter(|item| item.index < from && top <= item.up_threshold())
                .min_by_key(|item| item.index),
        }
    }
}

/// Gesture state; transitions consume the state and return the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState<K> {
    /// No drag in progress.
    Idle,
    /// An item is being dragged.
    Dragging(DragSession<K>),
}

impl<K> Default for DragState<K> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<K: Copy + PartialEq> DragState<K> {
    /// Pick up the item containing `y`.
    ///
    /// Stays idle when no item contains `y` or the item has no positive size.
    /// An ongoing drag is left untouched.
    #[must_use]
    pub fn start(self, y: f32, layout: &[ItemBounds<K>]) -> Self {
        if let Self::Dragging(_) = self {
            return self;
        }
        let Some(item) = layout.iter().find(|item| item.contains(y)) else {
            return Self::Idle;
        };
        let Some(size) = ItemSize::new(item.size) else {
            return Self::Idle;
        };
        Self::Dragging(DragSession {
            dragged: item.key,
            tracked: item.key,
            initial_offset: item.offset,
            size,
            displacement: 0.0,
            direction: None,
        })
    }

    /// Move the pointer by `dy` and report the swap, if any, the move triggers.
    #[must_use]
    pub fn drag(self, dy: f32, layout: &[ItemBounds<K>]) -> (Self, Option<Swap>) {
        let Self::Dragging(mut session) = self else {
            return (self, None);
        };
        session.displacement += dy;
        let direction = if dy > 0.0 {
            Some(Direction::Down)
        } else if dy < 0.0 {
            Some(Direction::Up)
        } else {
            session.direction
        };
        if session.direction.is_some() && direction != session.direction {
            session.tracked = session.dragged;
        }
        session.direction = direction;

        let Some(from) = layout
            .iter()
            .find(|item| item.key == session.dragged)
            .map(|item| item.index)
        else {
            return (Self::Dragging(session), None);
        };
        let swap = match session.target(from, layout) {
            Some(target) if target.key != session.tracked => {
                session.tracked = target.key;
                Some(Swap {
                    from,
                    to: target.index,
                })
            }
            _ => None,
        };
        (Self::Dragging(session), swap)
    }

    /// Drop the item where it is.
    #[must_use]
    pub const fn release(self) -> Self {
        Self::Idle
    }

    /// Abandon the gesture.
    #[must_use]
    pub const fn cancel(self) -> Self {
        Self::Idle
    }

    /// Translation to apply to the dragged item relative to its slot in `layout`.
    ///
    /// Zero when idle or when the dragged item is not in `layout`.
    #[must_use]
    pub fn dragged_offset(&self, layout: &[ItemBounds<K>]) -> f32 {
        let Self::Dragging(session) = self else {
            return 0.0;
        };
        layout
            .iter()
            .find(|item| item.key == session.dragged)
            .map_or(0.0, |item| session.projected_top() - item.offset)
    }

    /// Whether a drag is in progress.
    #[must_use]
    pub const fn is_dragging(&self) -> bool {
        matches!(self, Self::Dragging(_))
    }

    /// Key of the dragged item.
    #[must_use]
    pub const fn dragged_key(&self) -> Option<K> {
        match self {
            Self::Idle => None,
            Self::Dragging(session) => Some(session.dragged),
        }
    }

    /// Key of the item the last swap was emitted against.
    #[must_use]
    pub const fn tracked_key(&self) -> Option<K> {
        match self {
            Self::Idle => None,
            Self::Dragging(session) => Some(session.tracked),
        }
    }
}

/// Lay out `keys` as equally sized items starting at `origin`.
#[must_use]
pub fn uniform_layout<K: Copy>(keys: &[K], origin: f32, size: f32) -> Vec<ItemBounds<K>> {
    let mut offset = origin;
    keys.iter()
        .enumerate()
        .map(|(index, &key)| {
            let item = ItemBounds {
                key,
                index,
                offset,
                size,
            };
            offset += size;
            item
        })
        .collect()
}
