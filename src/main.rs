use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use ebeam_pdk::converter::convert_components;
use ebeam_pdk::export::{self, Format};
use ebeam_pdk::lyp::read_lyp;
use ebeam_pdk::registry::{ModelConfig, Registry};
use ebeam_pdk::technology::write_technology;
use ebeam_pdk::waveguide::read_waveguides;
use ebeam_pdk::{bar, component, config, ebeam, errorln, infoln, ui, vprintln, EbeamParams, Library, PdkError};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Technology parameter file (`key: value` lines)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Replace existing output files without asking
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Args, Debug)]
struct Output {
    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format; inferred from the output extension when omitted
    #[arg(short, long, value_enum)]
    format: Option<Format>,
}

impl Output {
    fn format(&self) -> Format {
        match (self.format, &self.output) {
            (Some(f), _) => f,
            (None, Some(path)) => Format::from_path(path),
            (None, None) => Format::Rust,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a KLayout layer properties file into layer table entries
    Layers {
        lyp: PathBuf,
        #[command(flatten)]
        out: Output,
    },
    /// Convert waveguide definition files into port specification entries
    Waveguides {
        #[arg(required = true)]
        xml: Vec<PathBuf>,
        #[command(flatten)]
        out: Output,
    },
    /// Scan the GDS component library and emit registry entries
    Components {
        /// Component library root
        #[arg(short, long)]
        library: Option<String>,
        #[command(flatten)]
        out: Output,
    },
    /// Write the EBeam technology as YAML or JSON
    Technology { output: PathBuf },
    /// Write the front-end form schema as JSON
    Ui {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Assemble a library component and summarize its ports
    Show {
        name: String,
        #[arg(short, long)]
        library: Option<String>,
    },
}

fn run(cli: &Cli) -> Result<(), PdkError> {
    let verbose = !cli.quiet;
    let interactive = !cli.yes;

    let params = match &cli.config {
        Some(path) => {
            vprintln!(verbose, "Reading technology parameters from {:?}...", path);
            config::read(path)?
        }
        None => EbeamParams::default(),
    };

    match &cli.command {
        Command::Layers { lyp, out } => {
            let records = read_lyp(lyp, verbose)?;
            let content = export::fmt_layers(&records, out.format())?;
            export::writeout(&content, out.output.as_deref(), interactive)?;
        }
        Command::Waveguides { xml, out } => {
            let paths: Vec<&Path> = xml.iter().map(PathBuf::as_path).collect();
            let records = read_waveguides(&paths, verbose)?;
            let content = export::fmt_waveguides(&records, out.format())?;
            export::writeout(&content, out.output.as_deref(), interactive)?;
        }
        Command::Components { library, out } => {
            let root = config::library_root(library.as_deref())?;
            vprintln!(verbose, "Scanning component library at {:?}...", root);
            let tech = ebeam(&params);
            let records = convert_components(&root, &tech.ports, verbose)?;
            let content = export::fmt_components(&records, out.format())?;
            export::writeout(&content, out.output.as_deref(), interactive)?;
        }
        Command::Technology { output } => {
            write_technology(&ebeam(&params), output, interactive, verbose)?;
        }
        Command::Ui { output } => {
            let schema = ui::generate(&Registry::ebeam());
            let content = serde_json::to_string_pretty(&schema)? + "\n";
            export::writeout(&content, output.as_deref(), interactive)?;
        }
        Command::Show { name, library } => {
            let root = config::library_root(library.as_deref())?;
            let lib = Library::new(root);
            vprintln!(verbose, "Assembling {} from {:?}...", name, lib.root());
            let tech = ebeam(&params);
            let comp = component(&lib, name, Some(&tech), &ModelConfig::new())?;
            print!("{}", export::fmt_component(&comp));
            println!("{}", bar(None, '-'));
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        errorln!("{}", e);
        process::exit(1);
    }

    if !cli.quiet {
        infoln!("Done");
    }
}
