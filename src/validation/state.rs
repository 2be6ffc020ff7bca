use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reference {
    Null,
    Packet { id: usize, offset: i64 },
}

impl Reference {
    pub fn fits(&self, packets: &Packets, words: i64) -> bool {
        match *self {
            Reference::Null => false,
            Reference::Packet { id, offset } => {
                let capacity = packets.capacity(id);
                capacity > 0 && offset >= 0 && offset.saturating_add(words) <= capacity
            }
        }
    }

    pub fn packet(&self) -> Option<usize> {
        match *self {
            Reference::Null => None,
            Reference::Packet { id, .. } => Some(id),
        }
    }

    pub fn shifted(&self, by: i64) -> Reference {
        match *self {
            Reference::Null => Reference::Null,
            Reference::Packet { id, offset } => Reference::Packet {
                id,
                offset: offset.saturating_add(by),
            },
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Null => f.write_str("null"),
            Reference::Packet { id, offset } => write!(f, "#{}+{}", id, offset),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct State {
    pub slots: Vec<Reference>,
}

impl State {
    pub fn new(slots: Vec<Reference>) -> Self {
        State { slots }
    }

    pub fn referenced_packets(&self) -> HashSet<usize> {
        self.slots.iter().filter_map(Reference::packet).collect()
    }

    pub fn forget(&mut self, id: usize) {
        for slot in &mut self.slots {
            if slot.packet() == Some(id) {
                *slot = Reference::Null;
            }
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", slot)?;
        }
        f.write_str("]")
    }
}

pub type StateSet = BTreeSet<State>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub capacity: i64,
    pub origin: Span,
}

/// Capacity table indexed by packet id. Entries are never removed while
/// states may still mention them, only zeroed, so ids stay comparable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packets {
    packets: Vec<Packet>,
}

impl Packets {
    pub fn allocate(&mut self, capacity: i64, origin: Span) -> usize {
        self.packets.push(Packet { capacity, origin });
        self.packets.len() - 1
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn capacity(&self, id: usize) -> i64 {
        self.packets.get(id).map_or(0, |p| p.capacity)
    }

    pub fn is_live(&self, id: usize) -> bool {
        self.capacity(id) > 0
    }

    pub fn get(&self, id: usize) -> Option<&Packet> {
        self.packets.get(id)
    }

    pub fn kill(&mut self, id: usize) {
        self.resize(id, 0);
    }

    pub fn resize(&mut self, id: usize, capacity: i64) {
        if let Some(packet) = self.packets.get_mut(id) {
            packet.capacity = capacity;
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.packets.truncate(len);
    }

    pub fn live(&self) -> impl Iterator<Item = (usize, &Packet)> + '_ {
        self.packets
            .iter()
            .enumerate()
            .filter(|(_, packet)| packet.capacity > 0)
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    /// Joins the tables two branches produced from `self`. Packets that
    /// existed before the branches stay live if either branch kept them
    /// (with the smaller capacity when both did); packets created inside a
    /// branch are dropped.
    pub fn join(&self, first: &Packets, second: &Packets) -> Packets {
        let packets = self
            .packets
            .iter()
            .enumerate()
            .map(|(id, before)| {
                let a = first.capacity(id);
                let b = second.capacity(id);
                let capacity = match (a > 0, b > 0) {
                    (true, true) => a.min(b),
                    _ => a.max(b),
                };
                Packet {
                    capacity,
                    origin: before.origin.clone(),
                }
            })
            .collect();
        Packets { packets }
    }
}
