//! Word-width reduction: shrink cell port widths wherever upper bits are
//! provably unused or redundant, then strip unused MSB runs from internal
//! wires.

use std::collections::BTreeSet;

use log::{info, warn};
use thiserror::Error;

use rtlir_netlist::{
    CellId, CellType, Design, Module, ModuleIndex, Selection, SigBit, SigSpec, Wire, WireId,
};

/// Errors reported by the command surface before any work begins.
#[derive(Debug, Error)]
pub enum WreduceError {
    #[error("unsupported option {0}")]
    UnsupportedOption(String),
}

fn nontrivial_attr_count(wire: &Wire) -> usize {
    wire.attributes.keys().filter(|name| *name != "src" && *name != "unused_bits").count()
}

struct Worker<'a> {
    module: &'a mut Module,
    index: ModuleIndex,
    // connects and cell removals leave the index stale until the next query
    index_stale: bool,
    queue_bits: BTreeSet<SigBit>,
}

impl<'a> Worker<'a> {
    fn new(module: &'a mut Module) -> Worker<'a> {
        let index = ModuleIndex::new(module);
        Worker { module, index, index_stale: false, queue_bits: BTreeSet::new() }
    }

    fn refresh(&mut self) {
        if self.index_stale {
            self.index = ModuleIndex::new(self.module);
            self.index_stale = false;
        }
    }

    /// `(is_output, reference_count)` for the canonical form of `bit`.
    fn query(&mut self, bit: SigBit) -> (bool, usize) {
        self.refresh();
        match self.index.query(bit) {
            Some(info) => (info.is_output, info.ports.len()),
            None => (false, 0),
        }
    }

    /// A cell port routed through the sigmap.
    fn port_mapped(&mut self, cell: CellId, name: &str) -> Option<SigSpec> {
        self.refresh();
        let sig = self.module.cell(cell).port(name)?;
        Some(self.index.map(sig))
    }

    fn set_port(&mut self, cell: CellId, name: &str, sig: SigSpec) {
        if !self.index_stale {
            if let Some(old) = self.module.cell(cell).port(name) {
                let old = old.clone();
                self.index.port_del(cell, name, &old);
            }
            self.index.port_add(cell, name, &sig);
        }
        self.module.cell_mut(cell).set_port(name, sig);
    }

    fn connect(&mut self, lhs: impl Into<SigSpec>, rhs: impl Into<SigSpec>) {
        self.module.connect(lhs, rhs);
        self.index_stale = true;
    }

    fn remove_cell(&mut self, cell: CellId) {
        self.module.remove_cell(cell);
        self.index_stale = true;
    }

    fn cell_label(&self, cell: CellId) -> (String, CellType) {
        let cell = self.module.cell(cell);
        (cell.name.clone(), cell.ty.clone())
    }

    /// Shrink a mux when its inputs agree on a top bit or an output bit is
    /// unused.
    fn run_cell_mux(&mut self, cell: CellId) {
        let (cell_name, ty) = self.cell_label(cell);
        let Some(sig_a) = self.port_mapped(cell, "A") else { return };
        let Some(sig_b) = self.port_mapped(cell, "B") else { return };
        let Some(sig_s) = self.port_mapped(cell, "S") else { return };
        let Some(sig_y) = self.port_mapped(cell, "Y") else { return };

        let mut removed: Vec<SigBit> = Vec::new();
        'scan: for i in (0..sig_y.len()).rev() {
            let (is_output, refs) = self.query(sig_y[i]);
            if !is_output && refs <= 1 {
                removed.push(SigBit::UNDEF);
                continue;
            }
            let mut reference = sig_a[i];
            for k in 0..sig_s.len() {
                let candidate = sig_b[k * sig_a.len() + i];
                if reference != SigBit::UNDEF && candidate != SigBit::UNDEF && reference != candidate
                {
                    break 'scan;
                }
                if candidate != SigBit::UNDEF {
                    reference = candidate;
                }
            }
            removed.push(reference);
        }

        if removed.is_empty() {
            return;
        }

        // `removed` was collected MSB first
        let sig_removed = SigSpec::from_iter(removed.iter().rev().copied());

        if removed.len() == sig_y.len() {
            info!("Removed cell {}.{} ({}).", self.module.name(), cell_name, ty);
            self.connect(sig_y, sig_removed);
            self.remove_cell(cell);
            return;
        }

        let n_removed = removed.len();
        let n_kept = sig_y.len() - n_removed;
        info!(
            "Removed top {} bits (of {}) from mux cell {}.{} ({}).",
            n_removed,
            sig_y.len(),
            self.module.name(),
            cell_name,
            ty
        );

        let mut queued = SigSpec::new();
        queued.append(&sig_a.extract(n_kept, n_removed));
        queued.append(&sig_y.extract(n_kept, n_removed));

        let new_a = sig_a.extract(0, n_kept);
        let new_y = sig_y.extract(0, n_kept);
        let mut new_b = SigSpec::new();
        for k in 0..sig_s.len() {
            new_b.append(&sig_b.extract(k * sig_a.len(), n_kept));
            queued.append(&sig_b.extract(k * sig_a.len() + n_kept, n_removed));
        }
        self.queue_bits.extend(queued.iter());

        self.set_port(cell, "A", new_a);
        self.set_port(cell, "B", new_b);
        self.set_port(cell, "Y", new_y);
        self.module.cell_mut(cell).fixup_parameters();
        self.connect(sig_y.extract(n_kept, n_removed), sig_removed);
    }

    /// Drop dead or redundantly extended top bits of an input port. Returns
    /// the port's signedness and whether anything changed.
    fn reduce_input_port(&mut self, cell: CellId, port: &str, max_port_size: usize) -> (bool, bool) {
        let (cell_name, ty) = self.cell_label(cell);
        let mut port_signed = self.module.cell(cell).param_bool(&format!("{port}_SIGNED"));
        let Some(mut sig) = self.port_mapped(cell, port) else { return (false, false) };

        // the shift amount is unsigned no matter what the parameter says
        if port == "B"
            && matches!(ty, CellType::Shl | CellType::Shr | CellType::Sshl | CellType::Sshr)
        {
            port_signed = false;
        }

        let mut bits_removed = 0;
        if sig.len() > max_port_size {
            self.queue_bits.extend(sig.extract(max_port_size, sig.len() - max_port_size).iter());
            bits_removed = sig.len() - max_port_size;
            sig = sig.extract(0, max_port_size);
        }

        if port_signed {
            while sig.len() > 1 && sig[sig.len() - 1] == sig[sig.len() - 2] {
                self.queue_bits.insert(sig.msb());
                sig.pop();
                bits_removed += 1;
            }
        } else {
            while sig.len() > 1 && sig.msb() == SigBit::ZERO {
                self.queue_bits.insert(sig.msb());
                sig.pop();
                bits_removed += 1;
            }
        }

        if bits_removed > 0 {
            info!(
                "Removed top {} bits (of {}) from port {} of cell {}.{} ({}).",
                bits_removed,
                sig.len() + bits_removed,
                port,
                self.module.name(),
                cell_name,
                ty
            );
            self.set_port(cell, port, sig);
            return (port_signed, true);
        }
        (port_signed, false)
    }

    fn run_cell(&mut self, cell: CellId) {
        let (cell_name, ty) = self.cell_label(cell);
        if !ty.wreduce_supported() {
            return;
        }
        if matches!(ty, CellType::Mux | CellType::Pmux) {
            return self.run_cell_mux(cell);
        }

        let mut did_something = false;

        // Reduce ports A and B based on the size of the output port.

        let y_len = self.module.cell(cell).port("Y").map_or(0, SigSpec::len);
        let mut max_a = self.module.cell(cell).port("A").map(SigSpec::len);
        let mut max_b = self.module.cell(cell).port("B").map(SigSpec::len);
        if ty.result_fits_operands() {
            max_a = max_a.map(|size| size.min(y_len));
            max_b = max_b.map(|size| size.min(y_len));
        }

        let mut port_a_signed = false;
        if let Some(max) = max_a {
            let (signed, changed) = self.reduce_input_port(cell, "A", max);
            port_a_signed = signed;
            did_something |= changed;
        }
        if let Some(max) = max_b {
            let (_, changed) = self.reduce_input_port(cell, "B", max);
            did_something |= changed;
        }

        // Reduce port Y based on the new input sizes and unused output bits.

        let Some(mut sig) = self.port_mapped(cell, "Y") else { return };

        let mut bits_removed = 0;
        if port_a_signed && ty == CellType::Shr {
            // no output trimming on $shr cells with a signed A input
        } else {
            while !sig.is_empty() {
                let (is_output, refs) = self.query(sig.msb());
                if is_output || refs > 1 {
                    break;
                }
                sig.pop();
                bits_removed += 1;
            }
        }

        if ty.output_capped() {
            let is_signed = self.module.cell(cell).param_bool("A_SIGNED");
            let a_size = self.module.cell(cell).port("A").map_or(0, SigSpec::len);
            let b_size = self.module.cell(cell).port("B").map_or(0, SigSpec::len);

            let mut max_y_size = a_size.max(b_size);
            if ty == CellType::Add {
                max_y_size += 1;
            }
            if ty == CellType::Mul {
                max_y_size = a_size + b_size;
            }

            while sig.len() > 1 && sig.len() > max_y_size {
                let top = sig.msb();
                let driver = if is_signed { sig[sig.len() - 2] } else { SigBit::ZERO };
                self.connect(SigSpec::from(top), SigSpec::from(driver));
                sig.pop();
                bits_removed += 1;
            }
        }

        if sig.is_empty() {
            info!("Removed cell {}.{} ({}).", self.module.name(), cell_name, ty);
            self.remove_cell(cell);
            return;
        }

        if bits_removed > 0 {
            info!(
                "Removed top {} bits (of {}) from port Y of cell {}.{} ({}).",
                bits_removed,
                sig.len() + bits_removed,
                self.module.name(),
                cell_name,
                ty
            );
            self.set_port(cell, "Y", sig);
            did_something = true;
        }

        if did_something {
            self.module.cell_mut(cell).fixup_parameters();
            self.run_cell(cell);
        }
    }

    fn sorted_by_name(&self, cells: impl IntoIterator<Item = CellId>) -> Vec<CellId> {
        let mut cells: Vec<CellId> = cells.into_iter().collect();
        cells.sort_by(|a, b| self.module.cell(*a).name.cmp(&self.module.cell(*b).name));
        cells
    }

    fn run(&mut self, selection: &Selection) {
        let module_name = self.module.name().to_owned();

        let mut queue = self.sorted_by_name(
            self.module
                .cells()
                .filter(|(_, cell)| selection.cell(&module_name, &cell.name))
                .map(|(id, _)| id)
                .collect::<Vec<_>>(),
        );

        while !queue.is_empty() {
            self.queue_bits.clear();
            for &cell in &queue {
                if self.module.has_cell(cell) {
                    self.run_cell(cell);
                }
            }

            self.refresh();
            let mut next: BTreeSet<CellId> = BTreeSet::new();
            for &bit in &self.queue_bits {
                if let Some(info) = self.index.query(bit) {
                    for &(cell, _) in &info.ports {
                        if selection.cell(&module_name, &self.module.cell(cell).name) {
                            next.insert(cell);
                        }
                    }
                }
            }
            queue = self.sorted_by_name(next);
        }

        // Strip the longest unused MSB run from internal wires.

        self.refresh();
        let wire_ids: Vec<WireId> = self
            .module
            .wires()
            .filter(|(_, wire)| selection.wire(&module_name, &wire.name))
            .map(|(id, _)| id)
            .collect();

        for id in wire_ids {
            let (wire_name, width) = {
                let wire = self.module.wire(id);
                if wire.port_id > 0 || nontrivial_attr_count(wire) > 0 {
                    continue;
                }
                (wire.name.clone(), wire.width)
            };

            let mut unused_top_bits = 0;
            for offset in (0..width).rev() {
                // connections added by this loop only alias fresh wires, so
                // the index built above stays accurate
                if let Some(info) = self.index.query(SigBit::wire(id, offset)) {
                    if info.is_input || info.is_output || !info.ports.is_empty() {
                        break;
                    }
                }
                unused_top_bits += 1;
            }

            if unused_top_bits == 0 || unused_top_bits == width {
                continue;
            }

            info!(
                "Removed top {} bits (of {}) from wire {}.{}.",
                unused_top_bits, width, module_name, wire_name
            );
            let kept = width - unused_top_bits;
            let new_id = self.module.add_wire(self.module.auto_name("wreduce"), kept);
            let attributes = self.module.wire(id).attributes.clone();
            self.module.wire_mut(new_id).attributes = attributes;
            self.module
                .connect(SigSpec::from_wire(new_id, kept), SigSpec::from_wire(id, width).extract(0, kept));
            self.module.swap_wire_names(id, new_id);
        }
    }
}

/// Run width reduction over every selected module.
pub fn wreduce(design: &mut Design, selection: &Selection) {
    for module in design.modules_mut() {
        if !selection.module(module.name()) {
            continue;
        }
        if !module.processes.is_empty() {
            warn!("Skipping module {} because it contains processes.", module.name());
            continue;
        }
        Worker::new(module).run(selection);
    }
}

/// `wreduce [options] [selection]` — no options are recognized; positional
/// arguments name the modules to process.
pub fn wreduce_command(design: &mut Design, args: &[String]) -> Result<(), WreduceError> {
    let mut selected = Vec::new();
    for arg in args {
        if arg.starts_with('-') {
            return Err(WreduceError::UnsupportedOption(arg.clone()));
        }
        selected.push(arg.clone());
    }

    info!("Executing WREDUCE pass (reducing word size of cells).");

    let selection =
        if selected.is_empty() { Selection::all() } else { Selection::modules(selected) };
    wreduce(design, &selection);
    Ok(())
}
