use std::collections::{BTreeSet, HashMap};

use union_find_rs::{disjoint_sets::DisjointSets, traits::UnionFind};

use crate::{CellId, Module, SigBit, SigSpec};

/// Canonicalization of signal bits under the equivalence induced by a
/// module's connection statements. Constants are sticky representatives;
/// among wire bits, the lowest `(wire, offset)` wins, so rebuilding the map
/// is deterministic.
#[derive(Clone, Debug)]
pub struct SigMap {
    canonical: HashMap<SigBit, SigBit>,
}

impl SigMap {
    pub fn new(module: &Module) -> SigMap {
        let mut sets: DisjointSets<SigBit> = DisjointSets::new();
        let mut bits: BTreeSet<SigBit> = BTreeSet::new();
        for (lhs, rhs) in module.connections() {
            for (left, right) in lhs.iter().zip(rhs.iter()) {
                for bit in [left, right] {
                    if bits.insert(bit) {
                        let _ = sets.make_set(bit);
                    }
                }
                // union() fails on items that already share a set
                if sets.find_set(&left).unwrap() != sets.find_set(&right).unwrap() {
                    sets.union(&left, &right).unwrap();
                }
            }
        }
        // `bits` iterates in sorted order and constants sort before wire
        // bits, so the first member seen per class is its representative.
        let mut leaders: HashMap<SigBit, SigBit> = HashMap::new();
        let mut canonical = HashMap::new();
        for &bit in &bits {
            let root = sets.find_set(&bit).unwrap();
            let leader = *leaders.entry(root).or_insert(bit);
            canonical.insert(bit, leader);
        }
        SigMap { canonical }
    }

    /// The canonical representative of a bit. Unregistered bits map to
    /// themselves.
    pub fn bit(&self, bit: SigBit) -> SigBit {
        self.canonical.get(&bit).copied().unwrap_or(bit)
    }

    pub fn map(&self, sig: &SigSpec) -> SigSpec {
        sig.iter().map(|bit| self.bit(bit)).collect()
    }
}

/// Everything the index knows about one canonical signal bit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortInfo {
    /// The bit is driven by a module input port.
    pub is_input: bool,
    /// The bit feeds a module output port.
    pub is_output: bool,
    /// Every cell port that references the bit.
    pub ports: BTreeSet<(CellId, String)>,
}

/// Driver/consumer index over a module's signals. The index is a snapshot:
/// after a module-level `connect` or cell removal it must be rebuilt, while
/// in-place port rewrites can be tracked with `port_del`/`port_add`.
#[derive(Clone, Debug)]
pub struct ModuleIndex {
    sigmap: SigMap,
    entries: HashMap<SigBit, PortInfo>,
}

impl ModuleIndex {
    pub fn new(module: &Module) -> ModuleIndex {
        let sigmap = SigMap::new(module);
        let mut index = ModuleIndex { sigmap, entries: HashMap::new() };
        for (id, wire) in module.wires() {
            if !wire.port_input && !wire.port_output {
                continue;
            }
            for offset in 0..wire.width {
                let bit = index.sigmap.bit(SigBit::Wire { wire: id, offset });
                if bit.is_const() {
                    continue;
                }
                let entry = index.entries.entry(bit).or_default();
                entry.is_input |= wire.port_input;
                entry.is_output |= wire.port_output;
            }
        }
        for (id, cell) in module.cells() {
            for (port, sig) in &cell.ports {
                index.port_add(id, port, sig);
            }
        }
        index
    }

    pub fn sigmap(&self) -> &SigMap {
        &self.sigmap
    }

    pub fn map(&self, sig: &SigSpec) -> SigSpec {
        self.sigmap.map(sig)
    }

    /// Port information for the canonical representative of `bit`. Constant
    /// bits and bits without any references have no entry.
    pub fn query(&self, bit: SigBit) -> Option<&PortInfo> {
        self.entries.get(&self.sigmap.bit(bit))
    }

    pub fn port_add(&mut self, cell: CellId, port: &str, sig: &SigSpec) {
        for bit in sig.iter() {
            let bit = self.sigmap.bit(bit);
            if bit.is_const() {
                continue;
            }
            self.entries.entry(bit).or_default().ports.insert((cell, port.to_owned()));
        }
    }

    pub fn port_del(&mut self, cell: CellId, port: &str, sig: &SigSpec) {
        for bit in sig.iter() {
            let bit = self.sigmap.bit(bit);
            if let Some(entry) = self.entries.get_mut(&bit) {
                entry.ports.remove(&(cell, port.to_owned()));
            }
        }
    }
}
