use rtlir_blif::{blif_command, write_blif, BlifConfig, BlifError, BufCell, ConstCell};
use rtlir_netlist::{Cell, CellType, Const, Design, Module, SigBit, SigSpec, WireId};

fn input(module: &mut Module, name: &str, width: usize, port_id: usize) -> WireId {
    let id = module.add_wire(name, width);
    let wire = module.wire_mut(id);
    wire.port_id = port_id;
    wire.port_input = true;
    id
}

fn output(module: &mut Module, name: &str, width: usize, port_id: usize) -> WireId {
    let id = module.add_wire(name, width);
    let wire = module.wire_mut(id);
    wire.port_id = port_id;
    wire.port_output = true;
    id
}

fn gate(module: &mut Module, name: &str, ty: CellType, ports: &[(&str, SigBit)]) {
    let mut cell = Cell::new(name, ty);
    for (port, bit) in ports {
        cell.set_port(*port, SigSpec::from(*bit));
    }
    module.add_cell(cell);
}

/// Emit and drop the version header, which every output starts with.
fn emit(design: &Design, config: &BlifConfig) -> String {
    let _ = env_logger::try_init();
    let mut buffer = Vec::new();
    write_blif(design, config, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    let (header, rest) = text.split_once('\n').unwrap();
    assert!(header.starts_with("# Generated by rtlir "));
    rest.to_owned()
}

#[track_caller]
fn assert_blif(design: &Design, config: &BlifConfig, expect: &str) {
    assert_eq!(emit(design, config), expect);
}

fn mux_design() -> Design {
    let mut design = Design::new();
    let module = design.add_module("top");
    let a = input(module, "a", 1, 1);
    let b = input(module, "b", 1, 2);
    let s = input(module, "s", 1, 3);
    let y = output(module, "y", 1, 4);
    gate(
        module,
        "mux",
        CellType::GateMux,
        &[
            ("A", SigBit::wire(a, 0)),
            ("B", SigBit::wire(b, 0)),
            ("S", SigBit::wire(s, 0)),
            ("Y", SigBit::wire(y, 0)),
        ],
    );
    design
}

#[test]
fn test_mux_gate() {
    assert_blif(
        &mux_design(),
        &BlifConfig::default(),
        "\n.model top\n.inputs a b s\n.outputs y\n\
         .names $false\n.names $true\n1\n\
         .names a b s y\n1-0 1\n-11 1\n.end\n",
    );
}

#[test]
fn test_simple_gates() {
    let mut design = Design::new();
    let module = design.add_module("top");
    let a = input(module, "a", 1, 1);
    let b = input(module, "b", 1, 2);
    let n = output(module, "n", 1, 3);
    let o = output(module, "o", 1, 4);
    gate(
        module,
        "inv",
        CellType::GateNot,
        &[("A", SigBit::wire(a, 0)), ("Y", SigBit::wire(n, 0))],
    );
    gate(
        module,
        "disj",
        CellType::GateOr,
        &[("A", SigBit::wire(a, 0)), ("B", SigBit::wire(b, 0)), ("Y", SigBit::wire(o, 0))],
    );
    assert_blif(
        &design,
        &BlifConfig::default(),
        "\n.model top\n.inputs a b\n.outputs n o\n\
         .names $false\n.names $true\n1\n\
         .names a n\n0 1\n\
         .names a b o\n1- 1\n-1 1\n.end\n",
    );
}

#[test]
fn test_latches() {
    let mut design = Design::new();
    let module = design.add_module("top");
    let c = input(module, "c", 1, 1);
    let d = input(module, "d", 1, 2);
    let q = output(module, "q", 2, 3);
    gate(
        module,
        "ff_n",
        CellType::GateDffN,
        &[("C", SigBit::wire(c, 0)), ("D", SigBit::wire(d, 0)), ("Q", SigBit::wire(q, 0))],
    );
    gate(
        module,
        "ff_p",
        CellType::GateDffP,
        &[("C", SigBit::wire(c, 0)), ("D", SigBit::wire(d, 0)), ("Q", SigBit::wire(q, 1))],
    );
    assert_blif(
        &design,
        &BlifConfig::default(),
        "\n.model top\n.inputs c d\n.outputs q[0] q[1]\n\
         .names $false\n.names $true\n1\n\
         .latch d q[0] fe c\n\
         .latch d q[1] re c\n.end\n",
    );
}

#[test]
fn test_lut() {
    let mut design = Design::new();
    let module = design.add_module("top");
    let a0 = input(module, "a0", 1, 1);
    let a1 = input(module, "a1", 1, 2);
    let y = output(module, "y", 1, 3);
    let mut cell = Cell::new("lut", CellType::Lut);
    cell.set_port("A", SigSpec::from_iter([SigBit::wire(a0, 0), SigBit::wire(a1, 0)]));
    cell.set_port("Y", SigSpec::from(SigBit::wire(y, 0)));
    cell.set_param("WIDTH", Const::from_uint(2, 32));
    cell.set_param("LUT", Const::from_string("1001"));
    module.add_cell(cell);
    assert_blif(
        &design,
        &BlifConfig::default(),
        "\n.model top\n.inputs a0 a1\n.outputs y\n\
         .names $false\n.names $true\n1\n\
         .names a0 a1 y\n00 1\n11 1\n.end\n",
    );
}

#[test]
fn test_lut_malformed() {
    let mut design = Design::new();
    let module = design.add_module("top");
    let a = input(module, "a", 2, 1);
    let y = output(module, "y", 1, 2);
    let mut cell = Cell::new("lut", CellType::Lut);
    cell.set_port("A", SigSpec::from_wire(a, 2));
    cell.set_port("Y", SigSpec::from(SigBit::wire(y, 0)));
    cell.set_param("WIDTH", Const::from_uint(2, 32));
    module.add_cell(cell);

    let mut buffer = Vec::new();
    let result = write_blif(&design, &BlifConfig::default(), &mut buffer);
    assert!(matches!(result, Err(BlifError::MalformedCell { cell, .. }) if cell == "lut"));
}

#[test]
fn test_identifier_sanitization() {
    let mut design = Design::new();
    let module = design.add_module("top");
    input(module, "foo#bar=baz", 1, 1);
    let text = emit(&design, &BlifConfig::default());
    assert!(text.contains(".inputs foo?bar?baz\n"));
    assert!(!text.contains('#'));
    for line in text.lines() {
        for token in line.split_whitespace().skip(1) {
            assert!(!token.contains('='), "stray = in token {token}");
        }
    }
}

#[test]
fn test_connections() {
    let mut design = Design::new();
    let module = design.add_module("top");
    let a = input(module, "a", 1, 1);
    let y = output(module, "y", 1, 2);
    module.connect(SigSpec::from(SigBit::wire(y, 0)), SigSpec::from(SigBit::wire(a, 0)));

    let body = "\n.model top\n.inputs a\n.outputs y\n.names $false\n.names $true\n1\n";
    assert_blif(&design, &BlifConfig::default(), &format!("{body}.names a y\n1 1\n.end\n"));
    assert_blif(
        &design,
        &BlifConfig { conn: true, ..Default::default() },
        &format!("{body}.conn a y\n.end\n"),
    );
    let buf = BufCell { ty: "BUF".into(), input: "I".into(), output: "O".into() };
    assert_blif(
        &design,
        &BlifConfig { buf: Some(buf), ..Default::default() },
        &format!("{body}.subckt BUF I=a O=y\n.end\n"),
    );
}

#[test]
fn test_constant_drivers() {
    let mut design = Design::new();
    let module = design.add_module("top");
    let y = output(module, "y", 1, 1);
    module.connect(SigSpec::from(SigBit::wire(y, 0)), SigSpec::from(SigBit::ONE));

    assert_blif(
        &design,
        &BlifConfig { impltf: true, ..Default::default() },
        "\n.model top\n.inputs\n.outputs y\n.names $true y\n1 1\n.end\n",
    );
    assert_blif(
        &design,
        &BlifConfig {
            true_cell: Some(ConstCell { ty: "VCC".into(), output: "Y".into() }),
            false_cell: Some(ConstCell { ty: "GND".into(), output: "Y".into() }),
            ..Default::default()
        },
        "\n.model top\n.inputs\n.outputs y\n\
         .subckt GND Y=$false\n.subckt VCC Y=$true\n\
         .names $true y\n1 1\n.end\n",
    );
}

#[test]
fn test_generic_cell_and_params() {
    let mut design = Design::new();
    let module = design.add_module("top");
    let a = input(module, "a", 2, 1);
    let y = output(module, "y", 2, 2);
    let mut cell = Cell::new("add", CellType::Add);
    cell.set_port("A", SigSpec::from_wire(a, 2));
    cell.set_port("B", SigSpec::from_iter([SigBit::ONE, SigBit::ZERO]));
    cell.set_port("Y", SigSpec::from_wire(y, 2));
    cell.set_param("A_SIGNED", Const::from_bool(false));
    cell.set_param("A_WIDTH", Const::from_uint(2, 4));
    cell.set_param("NAME", Const::from_string("a\"b\\c\x01"));
    module.add_cell(cell);

    let body = "\n.model top\n.inputs a[0] a[1]\n.outputs y[0] y[1]\n\
                .names $false\n.names $true\n1\n\
                .subckt $add A[0]=a[0] A[1]=a[1] B[0]=$true B[1]=$false Y[0]=y[0] Y[1]=y[1]\n";
    assert_blif(&design, &BlifConfig::default(), &format!("{body}.end\n"));
    assert_blif(
        &design,
        &BlifConfig { param: true, ..Default::default() },
        &format!(
            "{body}.param A_SIGNED 0\n.param A_WIDTH 0010\n.param NAME \"a\\\"b\\\\c\\001\"\n.end\n"
        ),
    );
}

#[test]
fn test_gates_mode() {
    let mut design = Design::new();
    design.add_module("child");
    let blackbox = design.add_module("bb");
    blackbox.attributes.insert("blackbox".into(), Const::from_bool(true));
    let module = design.add_module("top");
    let a = input(module, "a", 1, 1);
    for (name, ty) in [("u0", "child"), ("u1", "bb"), ("u2", "EXT")] {
        let mut cell = Cell::new(name, CellType::User(ty.into()));
        cell.set_port("I", SigSpec::from(SigBit::wire(a, 0)));
        module.add_cell(cell);
    }

    let config = BlifConfig { gates: true, impltf: true, ..Default::default() };
    let text = emit(&design, &config);
    assert!(text.contains(".subckt child I=a\n"));
    assert!(text.contains(".gate bb I=a\n"));
    assert!(text.contains(".gate EXT I=a\n"));
    // blackboxes get no .model of their own
    assert!(!text.contains(".model bb"));
    assert!(text.contains(".model child"));
}

#[test]
fn test_icells_mode() {
    let design = mux_design();
    let config = BlifConfig { icells: true, impltf: true, ..Default::default() };
    assert_blif(
        &design,
        &config,
        "\n.model top\n.inputs a b s\n.outputs y\n\
         .subckt $_MUX_ A=a B=b S=s Y=y\n.end\n",
    );
}

#[test]
fn test_top_module_order() {
    let mut design = Design::new();
    for name in ["alpha", "beta", "gamma"] {
        design.add_module(name);
    }

    let order = |text: &str| -> Vec<String> {
        text.lines()
            .filter_map(|line| line.strip_prefix(".model "))
            .map(str::to_owned)
            .collect()
    };

    let text = emit(&design, &BlifConfig::default());
    assert_eq!(order(&text), ["alpha", "beta", "gamma"]);

    let text = emit(&design, &BlifConfig { top: Some("beta".into()), ..Default::default() });
    assert_eq!(order(&text), ["beta", "alpha", "gamma"]);

    design.module_mut("gamma").unwrap().attributes.insert("top".into(), Const::from_bool(true));
    let text = emit(&design, &BlifConfig::default());
    assert_eq!(order(&text), ["gamma", "alpha", "beta"]);
}

#[test]
fn test_unknown_top() {
    let mut design = Design::new();
    design.add_module("top");
    let blackbox = design.add_module("bb");
    blackbox.attributes.insert("blackbox".into(), Const::from_bool(true));

    for name in ["missing", "bb"] {
        let config = BlifConfig { top: Some(name.into()), ..Default::default() };
        let mut buffer = Vec::new();
        let result = write_blif(&design, &config, &mut buffer);
        assert!(matches!(result, Err(BlifError::UnknownTop(top)) if top == name));
    }
}

#[test]
fn test_unmapped_modules_rejected() {
    let mut design = Design::new();
    let module = design.add_module("top");
    module.processes.push(rtlir_netlist::Process { name: "proc".into() });
    let mut buffer = Vec::new();
    let result = write_blif(&design, &BlifConfig::default(), &mut buffer);
    assert!(matches!(result, Err(BlifError::UnmappedProcesses(name)) if name == "top"));

    let mut design = Design::new();
    let module = design.add_module("top");
    module.memories.push(rtlir_netlist::MemoryDecl { name: "mem".into(), width: 8, size: 16 });
    let mut buffer = Vec::new();
    let result = write_blif(&design, &BlifConfig::default(), &mut buffer);
    assert!(matches!(result, Err(BlifError::UnmappedMemories(name)) if name == "top"));
}

#[test]
fn test_command_writes_file() {
    let design = mux_design();
    let path = std::env::temp_dir().join("rtlir_blif_command_test.blif");
    let path_text = path.to_str().unwrap().to_owned();
    blif_command(&design, &["-impltf".to_owned(), path_text.clone()]).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(".model top"));
    assert!(!text.contains("$true"));
    std::fs::remove_file(&path).unwrap();

    let result = blif_command(&design, &["-bogus".to_owned()]);
    assert!(matches!(result, Err(BlifError::UnsupportedOption(flag)) if flag == "-bogus"));
}
