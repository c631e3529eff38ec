// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of convparity (tensor-graph conversion parity harness).

//! convparity command line: list, inspect and run conversion parity cases.
//! Exits 0 when every selected case passes and 1 otherwise.

use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};

use convparity::artifacts::bundle_case_dir;
use convparity::cases::{all_cases, cases_for_family, families, find_case, CaseDefinition};
use convparity::config::{HarnessConfig, LOOPBACK};
use convparity::conformance::{render_suite, run_suite, ConformanceOptions};
use convparity::eval::value::format_tensor_summary;
use convparity::eval::ReferenceExecutor;
use convparity::export::export_case;
use convparity::harness::ReportFormat;
use convparity::ops::registry::traceable_ops;
use convparity::types::format_shape;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tensor-graph conversion parity harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog cases, families or registered operators.
    List {
        /// Only cases of this family.
        #[arg(long)]
        family: Option<String>,
        /// List family names instead of cases.
        #[arg(long)]
        families: bool,
        /// List traceable operators instead of cases.
        #[arg(long)]
        ops: bool,
    },
    /// Run cases through the converter and runtime and compare outputs.
    Run(RunArgs),
    /// Evaluate a case on the reference path only and summarize its outputs.
    Reference {
        case: String,
    },
    /// Freeze a case into a trace file without converting it.
    Export {
        case: String,
        /// Directory for the trace file.
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
    /// Print the traced graph of a case.
    Show {
        case: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Case names; all cases when empty.
    cases: Vec<String>,
    /// Run every case of this family.
    #[arg(long)]
    family: Option<String>,
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Converter program (`loopback` for the in-process converter).
    #[arg(long, value_name = "PROGRAM")]
    converter: Option<String>,
    /// Runtime program (`loopback` for the in-process interpreter).
    #[arg(long, value_name = "PROGRAM")]
    runtime: Option<String>,
    /// Root of the per-case working directories.
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,
    /// Keep artifacts of passing cases.
    #[arg(long)]
    keep_artifacts: bool,
    /// Worker threads.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,
    /// Report format (human|short|json).
    #[arg(long, value_name = "FORMAT", default_value = "human")]
    format: ReportFormat,
    /// Pack the working directory of every failed case into DIR.
    #[arg(long, value_name = "DIR")]
    bundle_failures: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    convparity::logging::init(cli.verbose);

    let result = match cli.command {
        Command::List { family, families, ops } => list(family.as_deref(), families, ops),
        Command::Run(args) => run(args),
        Command::Reference { case } => reference(&case),
        Command::Export { case, out } => export(&case, out),
        Command::Show { case } => show(&case),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error[convparity]: {err:#}");
            process::exit(1);
        }
    }
}

fn lookup(name: &str) -> Result<CaseDefinition> {
    find_case(name).ok_or_else(|| anyhow!("unknown case `{name}` (see `convparity list`)"))
}

fn list(family: Option<&str>, list_families: bool, ops: bool) -> Result<bool> {
    if ops {
        for op in traceable_ops() {
            let marker = if op.stochastic { " (stochastic)" } else { "" };
            println!("{:<20} {}{marker}", op.name, op.summary);
        }
        return Ok(true);
    }
    if list_families {
        for name in families() {
            println!("{name}");
        }
        return Ok(true);
    }
    let cases = match family {
        Some(f) => cases_for_family(f),
        None => all_cases(),
    };
    for case in cases {
        let inputs: Vec<String> = case.inputs.iter().map(|s| format_shape(s)).collect();
        println!("{:<28} {:<16} {:<12} {}", case.name, case.family, case.compare.to_string(), inputs.join(","));
    }
    Ok(true)
}

fn select_cases(args: &RunArgs) -> Result<Vec<CaseDefinition>> {
    let mut selected = Vec::new();
    if let Some(family) = &args.family {
        let cases = cases_for_family(family);
        if cases.is_empty() {
            return Err(anyhow!("unknown family `{family}`"));
        }
        selected.extend(cases);
    }
    for name in &args.cases {
        selected.push(lookup(name)?);
    }
    if selected.is_empty() {
        selected = all_cases();
    }
    Ok(selected)
}

fn run(args: RunArgs) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    config.apply_env();
    if let Some(program) = &args.converter {
        config.converter.program = Some(program.clone());
    }
    if let Some(program) = &args.runtime {
        config.runtime.program = Some(program.clone());
    }
    if let Some(dir) = &args.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    config.keep_artifacts |= args.keep_artifacts;

    let harness = config.build_harness().context("invalid harness configuration")?;
    tracing::info!(
        converter = config.converter.program.as_deref().unwrap_or(LOOPBACK),
        runtime = config.runtime.program.as_deref().unwrap_or(LOOPBACK),
        work_dir = %config.work_dir.display(),
        "harness ready"
    );

    let cases = select_cases(&args)?;
    let suite = run_suite(&harness, &cases, ConformanceOptions { jobs: config.jobs })?;
    println!("{}", render_suite(&suite, args.format));

    if let Some(dir) = &args.bundle_failures {
        for report in suite.failed() {
            match bundle_case_dir(report, dir) {
                Ok(path) => eprintln!("bundled {} -> {}", report.case, path.display()),
                Err(err) => eprintln!("error[bundle]: {}: {err:#}", report.case),
            }
        }
    }
    Ok(suite.passed())
}

fn reference(name: &str) -> Result<bool> {
    let case = lookup(name)?;
    let module = case.build_graph()?;
    let inputs = case.materialize_inputs();
    let outputs = ReferenceExecutor::new().evaluate(&module, &inputs, case.seed)?;
    for (slot, tensor) in outputs.iter().enumerate() {
        println!("out{slot}: {}", format_tensor_summary(tensor));
    }
    Ok(true)
}

fn export(name: &str, out: PathBuf) -> Result<bool> {
    let case = lookup(name)?;
    let module = case.build_graph()?;
    let exported = export_case(&case, &module, &out)?;
    println!("{} {}", exported.trace_path.display(), exported.manifest.to_cli_arg());
    Ok(true)
}

fn show(name: &str) -> Result<bool> {
    let case = lookup(name)?;
    let module = case.build_graph()?;
    print!("{module}");
    Ok(true)
}
