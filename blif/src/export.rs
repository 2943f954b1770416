use std::collections::BTreeMap;
use std::io::Write;

use rtlir_netlist::{Cell, CellType, Design, Module, SigBit, Trit, WireId};

use crate::{BlifConfig, BlifError};

/// Strip a leading escape marker and keep the BLIF tokenizer happy: `#` and
/// `=` may not appear inside a token.
fn ident(name: &str) -> String {
    let name = name.strip_prefix('\\').unwrap_or(name);
    name.chars().map(|chr| if chr == '#' || chr == '=' { '?' } else { chr }).collect()
}

fn malformed(cell: &Cell, reason: impl Into<String>) -> BlifError {
    BlifError::MalformedCell { cell: cell.name.clone(), reason: reason.into() }
}

/// Write one `.model` block per non-blackbox module, the requested (or
/// attribute-flagged) top module first.
pub fn write_blif(design: &Design, config: &BlifConfig, f: &mut impl Write) -> Result<(), BlifError> {
    let mut top_name = config.top.clone();
    if top_name.is_none() {
        top_name = design.top_module().map(|module| module.name().to_owned());
    }

    writeln!(f, "# Generated by rtlir {}", env!("CARGO_PKG_VERSION"))?;

    let mut deferred = Vec::new();
    for module in design.modules() {
        if module.bool_attribute("blackbox") {
            continue;
        }
        if !module.processes.is_empty() {
            return Err(BlifError::UnmappedProcesses(module.name().to_owned()));
        }
        if !module.memories.is_empty() {
            return Err(BlifError::UnmappedMemories(module.name().to_owned()));
        }
        if Some(module.name()) == top_name.as_deref() {
            Dumper { f: &mut *f, module, design, config }.dump()?;
            top_name = None;
            continue;
        }
        deferred.push(module);
    }

    if let Some(name) = top_name {
        return Err(BlifError::UnknownTop(name));
    }

    for module in deferred {
        Dumper { f: &mut *f, module, design, config }.dump()?;
    }
    Ok(())
}

struct Dumper<'a, W: Write> {
    f: &'a mut W,
    module: &'a Module,
    design: &'a Design,
    config: &'a BlifConfig,
}

impl<W: Write> Dumper<'_, W> {
    fn bit_token(&self, bit: SigBit) -> String {
        match bit {
            SigBit::Const(Trit::One) => "$true".to_owned(),
            SigBit::Const(_) => "$false".to_owned(),
            SigBit::Wire { wire, offset } => {
                let wire = self.module.wire(wire);
                let mut token = ident(&wire.name);
                if wire.width != 1 {
                    token.push_str(&format!("[{}]", offset));
                }
                token
            }
        }
    }

    fn subckt_or_gate(&self, ty: &str) -> &'static str {
        if !self.config.gates {
            return "subckt";
        }
        match self.design.module(ty) {
            Some(module) if !module.bool_attribute("blackbox") => "subckt",
            _ => "gate",
        }
    }

    fn single_bit(&self, cell: &Cell, port: &str) -> Result<SigBit, BlifError> {
        let sig = cell.port(port).ok_or_else(|| malformed(cell, format!("missing port {port}")))?;
        if sig.len() != 1 {
            return Err(malformed(cell, format!("port {port} must be one bit wide")));
        }
        Ok(sig[0])
    }

    fn port_token(&self, cell: &Cell, port: &str) -> Result<String, BlifError> {
        Ok(self.bit_token(self.single_bit(cell, port)?))
    }

    fn dump(&mut self) -> Result<(), BlifError> {
        let model = ident(self.module.name());
        writeln!(self.f)?;
        writeln!(self.f, ".model {}", model)?;

        let mut inputs: BTreeMap<usize, WireId> = BTreeMap::new();
        let mut outputs: BTreeMap<usize, WireId> = BTreeMap::new();
        for (id, wire) in self.module.wires() {
            if wire.port_input {
                inputs.insert(wire.port_id, id);
            }
            if wire.port_output {
                outputs.insert(wire.port_id, id);
            }
        }

        for (label, ports) in [(".inputs", &inputs), (".outputs", &outputs)] {
            write!(self.f, "{}", label)?;
            for &id in ports.values() {
                for offset in 0..self.module.wire(id).width {
                    let token = self.bit_token(SigBit::wire(id, offset));
                    write!(self.f, " {}", token)?;
                }
            }
            writeln!(self.f)?;
        }

        if !self.config.impltf {
            match self.config.false_cell.clone() {
                Some(cell) => {
                    let kind = self.subckt_or_gate(&cell.ty);
                    writeln!(self.f, ".{} {} {}=$false", kind, cell.ty, cell.output)?;
                }
                None => writeln!(self.f, ".names $false")?,
            }
            match self.config.true_cell.clone() {
                Some(cell) => {
                    let kind = self.subckt_or_gate(&cell.ty);
                    writeln!(self.f, ".{} {} {}=$true", kind, cell.ty, cell.output)?;
                }
                None => writeln!(self.f, ".names $true\n1")?,
            }
        }

        for (_, cell) in self.module.cells() {
            self.dump_cell(cell)?;
        }

        let buf = self.config.buf.clone();
        for (lhs, rhs) in self.module.connections() {
            for index in 0..lhs.len() {
                let driver = self.bit_token(rhs[index]);
                let driven = self.bit_token(lhs[index]);
                if self.config.conn {
                    writeln!(self.f, ".conn {} {}", driver, driven)?;
                } else if let Some(buf) = &buf {
                    let kind = self.subckt_or_gate(&buf.ty);
                    writeln!(
                        self.f,
                        ".{} {} {}={} {}={}",
                        kind, buf.ty, buf.input, driver, buf.output, driven
                    )?;
                } else {
                    writeln!(self.f, ".names {} {}\n1 1", driver, driven)?;
                }
            }
        }

        writeln!(self.f, ".end")?;
        Ok(())
    }

    fn dump_cell(&mut self, cell: &Cell) -> Result<(), BlifError> {
        if !self.config.icells {
            match cell.ty {
                CellType::GateNot => return self.names(cell, &["A", "Y"], &["0 1"]),
                CellType::GateAnd => return self.names(cell, &["A", "B", "Y"], &["11 1"]),
                CellType::GateOr => return self.names(cell, &["A", "B", "Y"], &["1- 1", "-1 1"]),
                CellType::GateXor => return self.names(cell, &["A", "B", "Y"], &["10 1", "01 1"]),
                // Y = S ? B : A
                CellType::GateMux => {
                    return self.names(cell, &["A", "B", "S", "Y"], &["1-0 1", "-11 1"])
                }
                CellType::GateDffN => return self.latch(cell, "fe"),
                CellType::GateDffP => return self.latch(cell, "re"),
                CellType::Lut => return self.lut(cell),
                _ => {}
            }
        }

        let kind = self.subckt_or_gate(cell.ty.as_str());
        write!(self.f, ".{} {}", kind, ident(cell.ty.as_str()))?;
        for (port, sig) in &cell.ports {
            let port = ident(port);
            for index in 0..sig.len() {
                let token = self.bit_token(sig[index]);
                if sig.len() == 1 {
                    write!(self.f, " {}={}", port, token)?;
                } else {
                    write!(self.f, " {}[{}]={}", port, index, token)?;
                }
            }
        }
        writeln!(self.f)?;

        if self.config.param {
            for (name, value) in &cell.parameters {
                let name = ident(name);
                if value.is_string() {
                    let quoted = quote_string(&value.decode_string());
                    writeln!(self.f, ".param {} {}", name, quoted)?;
                } else {
                    writeln!(self.f, ".param {} {}", name, value.as_string())?;
                }
            }
        }
        Ok(())
    }

    /// A `.names` line over the given single-bit ports plus its cover rows.
    fn names(&mut self, cell: &Cell, ports: &[&str], rows: &[&str]) -> Result<(), BlifError> {
        let mut tokens = Vec::new();
        for port in ports {
            tokens.push(self.port_token(cell, port)?);
        }
        writeln!(self.f, ".names {}", tokens.join(" "))?;
        for row in rows {
            writeln!(self.f, "{}", row)?;
        }
        Ok(())
    }

    fn latch(&mut self, cell: &Cell, edge: &str) -> Result<(), BlifError> {
        let d = self.port_token(cell, "D")?;
        let q = self.port_token(cell, "Q")?;
        let c = self.port_token(cell, "C")?;
        writeln!(self.f, ".latch {} {} {} {}", d, q, edge, c)?;
        Ok(())
    }

    fn lut(&mut self, cell: &Cell) -> Result<(), BlifError> {
        let width = cell
            .param_int("WIDTH")
            .ok_or_else(|| malformed(cell, "missing WIDTH parameter"))? as usize;
        let inputs = cell.port("A").ok_or_else(|| malformed(cell, "missing port A"))?;
        if inputs.len() != width {
            return Err(malformed(cell, "width of port A disagrees with WIDTH"));
        }
        let output = self.port_token(cell, "Y")?;
        let mask =
            cell.param("LUT").ok_or_else(|| malformed(cell, "missing LUT parameter"))?.as_string();
        if mask.len() != 1usize << width {
            return Err(malformed(cell, "length of LUT disagrees with WIDTH"));
        }

        let mut tokens = Vec::new();
        for bit in inputs.iter() {
            tokens.push(self.bit_token(bit));
        }
        tokens.push(output);
        writeln!(self.f, ".names {}", tokens.join(" "))?;

        // row index i selects the mask entry for input value i, MSB-first
        for (index, chr) in mask.chars().enumerate() {
            if chr == '0' {
                continue;
            }
            for column in (0..width).rev() {
                write!(self.f, "{}", (index >> column) & 1)?;
            }
            writeln!(self.f, " {}", chr)?;
        }
        Ok(())
    }
}

fn quote_string(value: &str) -> String {
    let mut quoted = String::from("\"");
    for byte in value.bytes() {
        match byte {
            b'"' | b'\\' => {
                quoted.push('\\');
                quoted.push(byte as char);
            }
            0x20..=0x7e => quoted.push(byte as char),
            _ => quoted.push_str(&format!("\\{:03o}", byte)),
        }
    }
    quoted.push('"');
    quoted
}
