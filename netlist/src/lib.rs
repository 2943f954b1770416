mod logic;
mod sig;
mod design;
mod index;
mod select;

pub use logic::{Const, Trit};
pub use sig::{SigBit, SigSpec};
pub use design::{Cell, CellId, CellType, Design, MemoryDecl, Module, Process, Wire, WireId};
pub use index::{ModuleIndex, PortInfo, SigMap};
pub use select::Selection;
