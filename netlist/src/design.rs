use std::collections::BTreeMap;
use std::fmt::Display;

use indexmap::IndexMap;

use crate::{Const, SigSpec};

/// Stable handle of a wire within its module. Handles survive removals; the
/// arena keeps a tombstone in place of a removed entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WireId(pub(crate) u32);

/// Stable handle of a cell within its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(pub(crate) u32);

/// The type of a cell: one variant per builtin primitive, and `User` for
/// instances of other modules (or primitives this crate does not know).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CellType {
    Not,
    Pos,
    Neg,
    And,
    Or,
    Xor,
    Xnor,
    Shl,
    Shr,
    Sshl,
    Sshr,
    Shift,
    Shiftx,
    Lt,
    Le,
    Eq,
    Ne,
    Eqx,
    Nex,
    Ge,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Mux,
    Pmux,
    GateNot,
    GateAnd,
    GateOr,
    GateXor,
    GateMux,
    GateDffN,
    GateDffP,
    Lut,
    User(String),
}

impl CellType {
    pub fn parse(name: &str) -> CellType {
        match name {
            "$not" => CellType::Not,
            "$pos" => CellType::Pos,
            "$neg" => CellType::Neg,
            "$and" => CellType::And,
            "$or" => CellType::Or,
            "$xor" => CellType::Xor,
            "$xnor" => CellType::Xnor,
            "$shl" => CellType::Shl,
            "$shr" => CellType::Shr,
            "$sshl" => CellType::Sshl,
            "$sshr" => CellType::Sshr,
            "$shift" => CellType::Shift,
            "$shiftx" => CellType::Shiftx,
            "$lt" => CellType::Lt,
            "$le" => CellType::Le,
            "$eq" => CellType::Eq,
            "$ne" => CellType::Ne,
            "$eqx" => CellType::Eqx,
            "$nex" => CellType::Nex,
            "$ge" => CellType::Ge,
            "$gt" => CellType::Gt,
            "$add" => CellType::Add,
            "$sub" => CellType::Sub,
            "$mul" => CellType::Mul,
            "$div" => CellType::Div,
            "$mod" => CellType::Mod,
            "$pow" => CellType::Pow,
            "$mux" => CellType::Mux,
            "$pmux" => CellType::Pmux,
            "$_NOT_" => CellType::GateNot,
            "$_AND_" => CellType::GateAnd,
            "$_OR_" => CellType::GateOr,
            "$_XOR_" => CellType::GateXor,
            "$_MUX_" => CellType::GateMux,
            "$_DFF_N_" => CellType::GateDffN,
            "$_DFF_P_" => CellType::GateDffP,
            "$lut" => CellType::Lut,
            _ => CellType::User(name.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CellType::Not => "$not",
            CellType::Pos => "$pos",
            CellType::Neg => "$neg",
            CellType::And => "$and",
            CellType::Or => "$or",
            CellType::Xor => "$xor",
            CellType::Xnor => "$xnor",
            CellType::Shl => "$shl",
            CellType::Shr => "$shr",
            CellType::Sshl => "$sshl",
            CellType::Sshr => "$sshr",
            CellType::Shift => "$shift",
            CellType::Shiftx => "$shiftx",
            CellType::Lt => "$lt",
            CellType::Le => "$le",
            CellType::Eq => "$eq",
            CellType::Ne => "$ne",
            CellType::Eqx => "$eqx",
            CellType::Nex => "$nex",
            CellType::Ge => "$ge",
            CellType::Gt => "$gt",
            CellType::Add => "$add",
            CellType::Sub => "$sub",
            CellType::Mul => "$mul",
            CellType::Div => "$div",
            CellType::Mod => "$mod",
            CellType::Pow => "$pow",
            CellType::Mux => "$mux",
            CellType::Pmux => "$pmux",
            CellType::GateNot => "$_NOT_",
            CellType::GateAnd => "$_AND_",
            CellType::GateOr => "$_OR_",
            CellType::GateXor => "$_XOR_",
            CellType::GateMux => "$_MUX_",
            CellType::GateDffN => "$_DFF_N_",
            CellType::GateDffP => "$_DFF_P_",
            CellType::Lut => "$lut",
            CellType::User(name) => name,
        }
    }

    /// Single-bit gate-level primitives; these carry no parameters.
    pub fn is_gate(&self) -> bool {
        matches!(
            self,
            CellType::GateNot
                | CellType::GateAnd
                | CellType::GateOr
                | CellType::GateXor
                | CellType::GateMux
                | CellType::GateDffN
                | CellType::GateDffP
        )
    }

    /// The cell types word reduction knows how to shrink. Multiplicative and
    /// division cells are excluded.
    pub fn wreduce_supported(&self) -> bool {
        matches!(
            self,
            CellType::Not
                | CellType::Pos
                | CellType::Neg
                | CellType::And
                | CellType::Or
                | CellType::Xor
                | CellType::Xnor
                | CellType::Shl
                | CellType::Shr
                | CellType::Sshl
                | CellType::Sshr
                | CellType::Shift
                | CellType::Shiftx
                | CellType::Lt
                | CellType::Le
                | CellType::Eq
                | CellType::Ne
                | CellType::Eqx
                | CellType::Nex
                | CellType::Ge
                | CellType::Gt
                | CellType::Add
                | CellType::Sub
                | CellType::Mux
                | CellType::Pmux
        )
    }

    /// Cell types whose result is never wider than their widest operand, so
    /// operand bits above the output width are dead.
    pub fn result_fits_operands(&self) -> bool {
        matches!(
            self,
            CellType::Not
                | CellType::Pos
                | CellType::Neg
                | CellType::And
                | CellType::Or
                | CellType::Xor
                | CellType::Add
                | CellType::Sub
        )
    }

    /// Cell types with a known maximum useful output width.
    pub fn output_capped(&self) -> bool {
        matches!(
            self,
            CellType::Pos | CellType::Add | CellType::Mul | CellType::And | CellType::Or | CellType::Xor
        )
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named wire. `port_id` zero marks an internal wire; ports are numbered
/// from one in declaration order.
#[derive(Clone, Debug)]
pub struct Wire {
    pub name: String,
    pub width: usize,
    pub port_id: usize,
    pub port_input: bool,
    pub port_output: bool,
    pub attributes: BTreeMap<String, Const>,
}

/// An instance of a primitive or of another module.
#[derive(Clone, Debug)]
pub struct Cell {
    pub name: String,
    pub ty: CellType,
    pub ports: IndexMap<String, SigSpec>,
    pub parameters: BTreeMap<String, Const>,
}

impl Cell {
    pub fn new(name: impl Into<String>, ty: CellType) -> Cell {
        Cell { name: name.into(), ty, ports: IndexMap::new(), parameters: BTreeMap::new() }
    }

    pub fn port(&self, name: &str) -> Option<&SigSpec> {
        self.ports.get(name)
    }

    pub fn has_port(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    pub fn set_port(&mut self, name: impl Into<String>, sig: SigSpec) {
        self.ports.insert(name.into(), sig);
    }

    pub fn param(&self, name: &str) -> Option<&Const> {
        self.parameters.get(name)
    }

    pub fn param_bool(&self, name: &str) -> bool {
        self.parameters.get(name).map(Const::as_bool).unwrap_or(false)
    }

    pub fn param_int(&self, name: &str) -> Option<i64> {
        self.parameters.get(name).and_then(Const::as_int)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<Const>) {
        self.parameters.insert(name.into(), value.into());
    }

    /// Recompute the width parameters from the current port widths. Gate-level
    /// primitives, `$lut`, and user cells are left alone.
    pub fn fixup_parameters(&mut self) {
        match self.ty {
            CellType::User(_) | CellType::Lut => return,
            _ if self.ty.is_gate() => return,
            CellType::Mux | CellType::Pmux => {
                if let Some(width) = self.port("Y").map(SigSpec::len) {
                    self.set_param("WIDTH", width as i32);
                }
                if self.ty == CellType::Pmux {
                    if let Some(width) = self.port("S").map(SigSpec::len) {
                        self.set_param("S_WIDTH", width as i32);
                    }
                }
            }
            _ => {
                for port in ["A", "B"] {
                    if let Some(width) = self.port(port).map(SigSpec::len) {
                        self.parameters
                            .entry(format!("{port}_SIGNED"))
                            .or_insert_with(|| Const::from_bool(false));
                        self.set_param(format!("{port}_WIDTH"), width as i32);
                    }
                }
                if let Some(width) = self.port("Y").map(SigSpec::len) {
                    self.set_param("Y_WIDTH", width as i32);
                }
            }
        }
    }
}

/// Unlowered behavioral content. Passes in this crate never interpret these,
/// they only refuse modules that still contain them.
#[derive(Clone, Debug)]
pub struct Process {
    pub name: String,
}

/// Unlowered memory declaration; same caveat as [`Process`].
#[derive(Clone, Debug)]
pub struct MemoryDecl {
    pub name: String,
    pub width: usize,
    pub size: usize,
}

/// A named container of wires, cells, and connection statements.
#[derive(Clone, Debug)]
pub struct Module {
    name: String,
    wires: Vec<Option<Wire>>,
    wire_index: IndexMap<String, WireId>,
    cells: Vec<Option<Cell>>,
    cell_index: IndexMap<String, CellId>,
    connections: Vec<(SigSpec, SigSpec)>,
    pub attributes: BTreeMap<String, Const>,
    pub processes: Vec<Process>,
    pub memories: Vec<MemoryDecl>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            wires: vec![],
            wire_index: IndexMap::new(),
            cells: vec![],
            cell_index: IndexMap::new(),
            connections: vec![],
            attributes: BTreeMap::new(),
            processes: vec![],
            memories: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bool_attribute(&self, name: &str) -> bool {
        self.attributes.get(name).map(Const::as_bool).unwrap_or(false)
    }

    pub fn add_wire(&mut self, name: impl Into<String>, width: usize) -> WireId {
        let name = name.into();
        assert!(width >= 1, "wire {} must be at least one bit wide", name);
        assert!(!self.wire_index.contains_key(&name), "duplicate wire {}", name);
        let id = WireId(self.wires.len() as u32);
        self.wires.push(Some(Wire {
            name: name.clone(),
            width,
            port_id: 0,
            port_input: false,
            port_output: false,
            attributes: BTreeMap::new(),
        }));
        self.wire_index.insert(name, id);
        id
    }

    pub fn wire(&self, id: WireId) -> &Wire {
        self.wires[id.0 as usize].as_ref().expect("use of removed wire")
    }

    pub fn wire_mut(&mut self, id: WireId) -> &mut Wire {
        self.wires[id.0 as usize].as_mut().expect("use of removed wire")
    }

    pub fn wire_id(&self, name: &str) -> Option<WireId> {
        self.wire_index.get(name).copied()
    }

    pub fn wires(&self) -> impl Iterator<Item = (WireId, &Wire)> {
        self.wires
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((WireId(index as u32), slot.as_ref()?)))
    }

    pub fn add_cell(&mut self, cell: Cell) -> CellId {
        assert!(!self.cell_index.contains_key(&cell.name), "duplicate cell {}", cell.name);
        let id = CellId(self.cells.len() as u32);
        self.cell_index.insert(cell.name.clone(), id);
        self.cells.push(Some(cell));
        id
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        self.cells[id.0 as usize].as_ref().expect("use of removed cell")
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        self.cells[id.0 as usize].as_mut().expect("use of removed cell")
    }

    pub fn cell_id(&self, name: &str) -> Option<CellId> {
        self.cell_index.get(name).copied()
    }

    pub fn has_cell(&self, id: CellId) -> bool {
        self.cells.get(id.0 as usize).map_or(false, Option::is_some)
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((CellId(index as u32), slot.as_ref()?)))
    }

    /// Remove a cell, leaving a tombstone so other ids stay valid.
    pub fn remove_cell(&mut self, id: CellId) {
        let cell = self.cells[id.0 as usize].take().expect("cell removed twice");
        self.cell_index.shift_remove(&cell.name);
    }

    /// Record that `lhs` is driven by `rhs`.
    pub fn connect(&mut self, lhs: impl Into<SigSpec>, rhs: impl Into<SigSpec>) {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        assert_eq!(lhs.len(), rhs.len(), "connection width mismatch in module {}", self.name);
        self.connections.push((lhs, rhs));
    }

    pub fn connections(&self) -> &[(SigSpec, SigSpec)] {
        &self.connections
    }

    /// Exchange the names of two wires, keeping both ids valid. Used when a
    /// narrowed replacement wire takes over the original name.
    pub fn swap_wire_names(&mut self, a: WireId, b: WireId) {
        let name_a = self.wire(a).name.clone();
        let name_b = self.wire(b).name.clone();
        self.wire_mut(a).name = name_b.clone();
        self.wire_mut(b).name = name_a.clone();
        self.wire_index.insert(name_b, a);
        self.wire_index.insert(name_a, b);
    }

    /// A fresh `$prefix$N` name not yet used by any wire or cell.
    pub fn auto_name(&self, prefix: &str) -> String {
        for counter in 1.. {
            let name = format!("${}${}", prefix, counter);
            if !self.wire_index.contains_key(&name) && !self.cell_index.contains_key(&name) {
                return name;
            }
        }
        unreachable!()
    }

    /// The full bit vector of a wire.
    pub fn wire_sig(&self, id: WireId) -> SigSpec {
        SigSpec::from_wire(id, self.wire(id).width)
    }
}

/// A collection of modules keyed by name, in source order.
#[derive(Clone, Debug, Default)]
pub struct Design {
    modules: IndexMap<String, Module>,
}

impl Design {
    pub fn new() -> Design {
        Default::default()
    }

    pub fn add_module(&mut self, name: impl Into<String>) -> &mut Module {
        let name = name.into();
        assert!(!self.modules.contains_key(&name), "duplicate module {}", name);
        self.modules.entry(name.clone()).or_insert_with(|| Module::new(name))
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.values_mut()
    }

    /// The module carrying a true `top` attribute, if any.
    pub fn top_module(&self) -> Option<&Module> {
        self.modules.values().find(|module| module.bool_attribute("top"))
    }
}

#[cfg(test)]
mod test {
    use crate::{Cell, CellType, Const, Design, Module, SigSpec};

    #[test]
    fn test_wires() {
        let mut module = Module::new("top");
        let a = module.add_wire("a", 4);
        let b = module.add_wire("b", 1);
        assert_eq!(module.wire(a).width, 4);
        assert_eq!(module.wire_id("a"), Some(a));
        assert_eq!(module.wire_id("c"), None);
        assert_eq!(module.wires().count(), 2);
        module.swap_wire_names(a, b);
        assert_eq!(module.wire(a).name, "b");
        assert_eq!(module.wire_id("a"), Some(b));
    }

    #[test]
    #[should_panic(expected = "duplicate wire")]
    fn test_duplicate_wire() {
        let mut module = Module::new("top");
        module.add_wire("a", 1);
        module.add_wire("a", 2);
    }

    #[test]
    fn test_cells() {
        let mut module = Module::new("top");
        let a = module.add_wire("a", 2);
        let y = module.add_wire("y", 2);
        let mut cell = Cell::new("inv", CellType::Not);
        cell.set_port("A", module.wire_sig(a));
        cell.set_port("Y", module.wire_sig(y));
        let id = module.add_cell(cell);
        assert_eq!(module.cell_id("inv"), Some(id));
        assert!(module.has_cell(id));
        module.remove_cell(id);
        assert!(!module.has_cell(id));
        assert_eq!(module.cell_id("inv"), None);
        assert_eq!(module.cells().count(), 0);
    }

    #[test]
    #[should_panic(expected = "connection width mismatch")]
    fn test_connect_width() {
        let mut module = Module::new("top");
        let a = module.add_wire("a", 2);
        let b = module.add_wire("b", 3);
        module.connect(module.wire_sig(a), module.wire_sig(b));
    }

    #[test]
    fn test_fixup_parameters() {
        let mut module = Module::new("top");
        let a = module.add_wire("a", 3);
        let y = module.add_wire("y", 5);
        let mut cell = Cell::new("add", CellType::Add);
        cell.set_port("A", module.wire_sig(a));
        cell.set_port("B", SigSpec::from(&Const::lit("01")));
        cell.set_port("Y", module.wire_sig(y));
        cell.fixup_parameters();
        assert_eq!(cell.param_int("A_WIDTH"), Some(3));
        assert_eq!(cell.param_int("B_WIDTH"), Some(2));
        assert_eq!(cell.param_int("Y_WIDTH"), Some(5));
        assert!(!cell.param_bool("A_SIGNED"));

        let mut gate = Cell::new("g", CellType::GateAnd);
        gate.set_port("A", SigSpec::from(&Const::lit("1")));
        gate.fixup_parameters();
        assert!(gate.parameters.is_empty());
    }

    #[test]
    fn test_cell_type_names() {
        for name in ["$not", "$add", "$pmux", "$_DFF_N_", "$lut"] {
            assert_eq!(CellType::parse(name).as_str(), name);
        }
        assert_eq!(CellType::parse("sub_module"), CellType::User("sub_module".into()));
        assert!(CellType::Add.wreduce_supported());
        assert!(!CellType::Mul.wreduce_supported());
        assert!(CellType::GateMux.is_gate());
        assert!(!CellType::Lut.is_gate());
    }

    #[test]
    fn test_design() {
        let mut design = Design::new();
        design.add_module("alpha");
        let beta = design.add_module("beta");
        beta.attributes.insert("top".into(), Const::from_bool(true));
        let names: Vec<_> = design.modules().map(|m| m.name().to_owned()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(design.top_module().unwrap().name(), "beta");
    }
}
