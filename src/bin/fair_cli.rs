#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = native::run() {
        eprintln!("fair_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use fairing_engine::fair::{
        Continuity, EdgeWeight, FairMesh, FairOptions, FairingResult, Vec3, VertexWeight,
        build_adjacency, fair, mean_curvature, operator_residual, partition_from_selection,
        select_by_mask,
    };
    use std::fmt::Write as _;
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    const SNAPSHOT_QUANTIZE: f64 = 1e-6;
    const SNAPSHOT_DECIMALS: usize = 6;

    const USAGE: &str = r"fair_cli (fairing-engine)

USAGE:
  fair_cli list
  fair_cli run <scenario|all> [options]

SCENARIOS:
  flat_patch
  paraboloid_patch
  two_islands
  sculpt_mask
  closed_octahedron

OPTIONS (run):
  --continuity <c>       smooth | pos | tan | curv (default: tan)
  --vertex-weight <w>    uniform | barycentric | voronoi (default: uniform)
  --edge-weight <w>      uniform | cotangent | mean_value (default: uniform)
  --pre-fair             Run a uniform POS pass before TAN/CURV
  --regularize           Solve unanchored blocks by regularization
  --out-dir <dir>        Write <scenario>.snap and <scenario>.obj to this dir
  --overwrite            Overwrite existing output files
  -h, --help             Show this help
";

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                print_scenarios();
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn print_scenarios() {
        for scenario in Scenario::ALL {
            println!("{}", scenario.name());
        }
    }

    struct RunSettings {
        continuity: Continuity,
        options: FairOptions,
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let scenario_name = args.next().ok_or("missing scenario name")?;

        let mut settings = RunSettings {
            continuity: Continuity::Tan,
            options: FairOptions::default(),
        };
        let mut out_dir: Option<PathBuf> = None;
        let mut overwrite = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--continuity" => settings.continuity = args.value("--continuity")?.parse()?,
                "--vertex-weight" => {
                    settings.options.vertex_weight = args.value("--vertex-weight")?.parse::<VertexWeight>()?;
                }
                "--edge-weight" => {
                    settings.options.edge_weight = args.value("--edge-weight")?.parse::<EdgeWeight>()?;
                }
                "--pre-fair" => settings.options.pre_fair = true,
                "--regularize" => settings.options.regularize_unanchored = true,
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--overwrite" => overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let scenarios: Vec<Scenario> = if scenario_name == "all" {
            Scenario::ALL.to_vec()
        } else {
            vec![Scenario::from_str(&scenario_name).ok_or_else(|| unknown_scenario(&scenario_name))?]
        };

        if let Some(dir) = out_dir.as_ref() {
            fs::create_dir_all(dir).map_err(|e| format!("create out dir: {e}"))?;
        }

        for scenario in scenarios {
            let output = run_scenario(scenario, &settings)?;
            match out_dir.as_deref() {
                Some(dir) => {
                    let snap = dir.join(format!("{}.snap", output.name));
                    write_text_file(&snap, &output.snapshot, overwrite)?;
                    eprintln!("wrote {}", snap.display());
                    let obj = dir.join(format!("{}.obj", output.name));
                    write_obj_file(&obj, &output.mesh, output.name, overwrite)?;
                    eprintln!("wrote {}", obj.display());
                }
                None => print!("{}", output.snapshot),
            }
            eprintln!(
                "{}: vertices={} faces={} | {}",
                output.name,
                output.mesh.positions.len(),
                output.mesh.faces.len(),
                output.result.diagnostics.summary()
            );
        }

        Ok(())
    }

    fn unknown_scenario(name: &str) -> String {
        let mut msg = format!("unknown scenario `{name}`\n\navailable scenarios:\n");
        for scenario in Scenario::ALL {
            let _ = writeln!(msg, "  {}", scenario.name());
        }
        msg
    }

    fn write_text_file(path: &Path, text: &str, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        fs::write(path, normalize_snapshot_text(text)).map_err(|e| format!("write {}: {e}", path.display()))
    }

    fn write_obj_file(path: &Path, mesh: &FairMesh, name: &str, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }

        let file = File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        let mut w = BufWriter::new(file);

        writeln!(w, "# fairing-engine fair_cli").map_err(|e| format!("write obj: {e}"))?;
        writeln!(w, "o {name}").map_err(|e| format!("write obj: {e}"))?;
        for p in &mesh.positions {
            writeln!(w, "v {} {} {}", p[0], p[1], p[2]).map_err(|e| format!("write obj: {e}"))?;
        }
        for face in &mesh.faces {
            let indices: Vec<String> = face.iter().map(|i| (i + 1).to_string()).collect();
            writeln!(w, "f {}", indices.join(" ")).map_err(|e| format!("write obj: {e}"))?;
        }

        w.flush().map_err(|e| format!("flush {}: {e}", path.display()))
    }

    fn normalize_snapshot_text(text: &str) -> String {
        let normalized = text.replace("\r\n", "\n");
        if normalized.ends_with('\n') {
            normalized
        } else {
            format!("{normalized}\n")
        }
    }

    fn quantize_f64(value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let q = (value / SNAPSHOT_QUANTIZE).round() * SNAPSHOT_QUANTIZE;
        if q == 0.0 { 0.0 } else { q }
    }

    fn write_f64(out: &mut String, value: f64) {
        let value = quantize_f64(value);
        let _ = write!(out, "{value:.SNAPSHOT_DECIMALS$}");
    }

    fn write_vertex_line(out: &mut String, v: usize, p: [f64; 3]) {
        let _ = write!(out, "p {v} ");
        write_f64(out, p[0]);
        out.push(' ');
        write_f64(out, p[1]);
        out.push(' ');
        write_f64(out, p[2]);
        out.push('\n');
    }

    fn snapshot(name: &str, settings: &RunSettings, sections: impl FnOnce(&mut String)) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# fairing-engine snapshot v1");
        let _ = writeln!(out, "scenario {name}");
        let _ = writeln!(out, "continuity {}", settings.continuity);
        let _ = writeln!(
            out,
            "weights {:?} {:?}",
            settings.options.vertex_weight, settings.options.edge_weight
        );
        let _ = writeln!(out, "quantize {SNAPSHOT_QUANTIZE:.1e}");
        sections(&mut out);
        normalize_snapshot_text(&out)
    }

    fn write_result(
        out: &mut String,
        mesh: &FairMesh,
        free: &[usize],
        options: &FairOptions,
        result: &FairingResult,
    ) {
        let _ = writeln!(out, "summary {}", result.diagnostics.summary());
        let _ = writeln!(out, "cancelled {}", result.cancelled);

        let _ = writeln!(out, "updated {}", result.updated_positions.len());
        for (&v, &p) in &result.updated_positions {
            write_vertex_line(out, v, p);
        }

        let _ = writeln!(out, "degenerate_blocks {}", result.degenerate_blocks.len());
        for block in &result.degenerate_blocks {
            let ids: Vec<String> = block.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "d {}", ids.join(" "));
        }

        let _ = writeln!(out, "warnings {}", result.warnings.len());
        for warning in &result.warnings {
            let _ = writeln!(out, "w [{}] {warning}", warning.category());
        }

        let Ok(adjacency) = build_adjacency(mesh) else {
            return;
        };
        let positions: Vec<Vec3> = mesh.positions.iter().copied().map(Vec3::from).collect();
        let (vertex_weight, edge_weight) = (options.vertex_weight, options.edge_weight);
        let moved: Vec<usize> = free
            .iter()
            .copied()
            .filter(|v| result.updated_positions.contains_key(v))
            .collect();

        for continuity in [Continuity::Pos, Continuity::Tan] {
            let total: f64 = moved
                .iter()
                .map(|&v| operator_residual(&adjacency, &positions, v, continuity, vertex_weight, edge_weight))
                .sum();
            let _ = write!(out, "residual.{continuity} ");
            write_f64(out, total);
            out.push('\n');
        }

        let max_mean = moved
            .iter()
            .map(|&v| mean_curvature(&adjacency, &positions, v, vertex_weight, edge_weight).abs())
            .fold(0.0_f64, f64::max);
        out.push_str("mean_curvature.max ");
        write_f64(out, max_mean);
        out.push('\n');
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Scenario {
        FlatPatch,
        ParaboloidPatch,
        TwoIslands,
        SculptMask,
        ClosedOctahedron,
    }

    impl Scenario {
        const ALL: &'static [Scenario] = &[
            Scenario::FlatPatch,
            Scenario::ParaboloidPatch,
            Scenario::TwoIslands,
            Scenario::SculptMask,
            Scenario::ClosedOctahedron,
        ];

        fn name(self) -> &'static str {
            match self {
                Scenario::FlatPatch => "flat_patch",
                Scenario::ParaboloidPatch => "paraboloid_patch",
                Scenario::TwoIslands => "two_islands",
                Scenario::SculptMask => "sculpt_mask",
                Scenario::ClosedOctahedron => "closed_octahedron",
            }
        }

        fn from_str(name: &str) -> Option<Self> {
            match name {
                "flat_patch" => Some(Scenario::FlatPatch),
                "paraboloid_patch" => Some(Scenario::ParaboloidPatch),
                "two_islands" => Some(Scenario::TwoIslands),
                "sculpt_mask" => Some(Scenario::SculptMask),
                "closed_octahedron" => Some(Scenario::ClosedOctahedron),
                _ => None,
            }
        }
    }

    struct ScenarioOutput {
        name: &'static str,
        mesh: FairMesh,
        result: FairingResult,
        snapshot: String,
    }

    fn run_scenario(scenario: Scenario, settings: &RunSettings) -> Result<ScenarioOutput, String> {
        let (mut mesh, free, fixed) = match scenario {
            Scenario::FlatPatch => flat_patch(),
            Scenario::ParaboloidPatch => paraboloid_patch(),
            Scenario::TwoIslands => two_islands(),
            Scenario::SculptMask => sculpt_mask(settings.continuity)?,
            Scenario::ClosedOctahedron => closed_octahedron(),
        };

        let result = fair(&mut mesh, &free, &fixed, settings.continuity, &settings.options)
            .map_err(|e| e.to_string())?;
        let name = scenario.name();
        let snapshot = snapshot(name, settings, |out| write_result(out, &mesh, &free, &settings.options, &result));

        Ok(ScenarioOutput {
            name,
            mesh,
            result,
            snapshot,
        })
    }

    type Setup = (FairMesh, Vec<usize>, Vec<usize>);

    /// Square grid whose vertices at least `rings` steps from the border are
    /// free and lifted to `z`; everything else is fixed.
    fn lifted_grid(n: usize, rings: usize, z: f64) -> Setup {
        let mut mesh = FairMesh::quad_grid(n, n);
        let (free, fixed): (Vec<usize>, Vec<usize>) = (0..n * n).partition(|&v| {
            let (i, j) = (v % n, v / n);
            i >= rings && j >= rings && i + rings < n && j + rings < n
        });
        for &v in &free {
            mesh.positions[v][2] = z;
        }
        (mesh, free, fixed)
    }

    fn flat_patch() -> Setup {
        lifted_grid(5, 1, 1.0)
    }

    fn paraboloid_patch() -> Setup {
        let (mut mesh, free, fixed) = lifted_grid(9, 2, 3.0);
        for &v in &fixed {
            let p = &mut mesh.positions[v];
            let (dx, dy) = (p[0] - 4.0, p[1] - 4.0);
            p[2] = (dx * dx + dy * dy) / 8.0;
        }
        (mesh, free, fixed)
    }

    fn two_islands() -> Setup {
        let mut mesh = FairMesh::quad_grid(11, 5);
        let (free, fixed): (Vec<usize>, Vec<usize>) = (0..55).partition(|&v| {
            let (i, j) = (v % 11, v / 11);
            (1..=3).contains(&j) && ((1..=3).contains(&i) || (7..=9).contains(&i))
        });
        for &v in &free {
            mesh.positions[v][2] = if v % 11 < 5 { 1.0 } else { -1.0 };
        }
        (mesh, free, fixed)
    }

    fn sculpt_mask(continuity: Continuity) -> Result<Setup, String> {
        let mut mesh = FairMesh::quad_grid(12, 12);
        for p in &mut mesh.positions {
            p[2] = 0.25 * (p[0] * 1.3).sin() * (p[1] * 0.7).cos();
        }
        // Unmasked disc in the middle.
        let mask: Vec<f64> = mesh
            .positions
            .iter()
            .map(|p| {
                let (dx, dy) = (p[0] - 5.5, p[1] - 5.5);
                if dx * dx + dy * dy < 6.0 { 0.0 } else { 1.0 }
            })
            .collect();
        let adjacency = build_adjacency(&mesh).map_err(|e| e.to_string())?;
        let selection = partition_from_selection(&adjacency, &select_by_mask(&mask, false), continuity);
        Ok((mesh, selection.free, selection.fixed))
    }

    fn closed_octahedron() -> Setup {
        let mesh = FairMesh::new(
            vec![
                [1.0, 0.0, 2.0],
                [-1.0, 0.0, 2.0],
                [0.0, 1.0, 2.0],
                [0.0, -1.0, 2.0],
                [0.0, 0.0, 3.0],
                [0.0, 0.0, 1.0],
            ],
            vec![
                vec![0, 2, 4],
                vec![2, 1, 4],
                vec![1, 3, 4],
                vec![3, 0, 4],
                vec![2, 0, 5],
                vec![1, 2, 5],
                vec![3, 1, 5],
                vec![0, 3, 5],
            ],
        );
        (mesh, (0..6).collect(), Vec::new())
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next().ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
