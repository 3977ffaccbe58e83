// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    debian_ordering::{
        architecture::Architecture,
        build_order::source_build_order,
        control::ControlParagraphReader,
        dependency::Dependency,
        error::DebianError,
        package_version::PackageVersion,
        schema::{ParagraphSchema, SourcePackage},
    },
    log::{info, LevelFilter},
    std::{cmp::Ordering, io::Write},
    thiserror::Error,
};

const BUILD_ORDER_ABOUT: &str = "\
Compute the order in which source packages must be built.

The input is a Sources style control file: one paragraph per source package,
with the source name in a `Package` or `Source` field. The `Binary` field
lists the binary packages a source produces. `Build-Depends`,
`Build-Depends-Arch` and `Build-Depends-Indep` name binary packages; these
are mapped back to the source package producing them.

Build dependencies are filtered by the architecture given with `--arch`.
Dependencies on packages not built by any listed source are ignored.

Sources are printed one per line. A source is only printed after every
source it depends on. If the dependencies form a cycle, nothing is printed
and the sources that could not be ordered are reported.
";

#[derive(Debug, Error)]
pub enum DordError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Debian(#[from] DebianError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, DordError>;

fn app() -> Command<'static> {
    let app = Command::new("Debian Ordering Tool")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Compare Debian versions and order package builds")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("version")
            .about("Parse a version and print its components")
            .arg(
                Arg::new("strict")
                    .long("strict")
                    .help("Require the upstream version to start with a digit"),
            )
            .arg(
                Arg::new("input")
                    .required(true)
                    .help("Version string to parse"),
            ),
    );

    let app = app.subcommand(
        Command::new("compare")
            .about("Compare two versions, printing <, = or >")
            .arg(Arg::new("a").required(true).help("First version"))
            .arg(Arg::new("b").required(true).help("Second version")),
    );

    let app = app.subcommand(
        Command::new("dependency")
            .about("Parse a dependency expression")
            .arg(
                Arg::new("arch")
                    .long("arch")
                    .takes_value(true)
                    .help("Only print the alternatives applying to this architecture"),
            )
            .arg(
                Arg::new("json")
                    .long("json")
                    .help("Print the parsed expression as JSON"),
            )
            .arg(
                Arg::new("expression")
                    .required(true)
                    .help("Dependency expression, e.g. `libc6 (>= 2.4), foo | bar`"),
            ),
    );

    app.subcommand(
        Command::new("build-order")
            .about("Print the build order of source packages")
            .long_about(BUILD_ORDER_ABOUT)
            .arg(
                Arg::new("arch")
                    .long("arch")
                    .takes_value(true)
                    .required(true)
                    .help("Architecture to build for"),
            )
            .arg(
                Arg::new("sources")
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Path to a Sources style control file"),
            ),
    )
}

fn init_logging(matches: &ArgMatches) {
    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();
}

pub fn run_cli() -> Result<()> {
    let matches = app().get_matches();

    init_logging(&matches);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    dispatch(&matches, &mut out)
}

fn dispatch(matches: &ArgMatches, out: &mut impl Write) -> Result<()> {
    match matches.subcommand() {
        Some(("version", args)) => command_version(args, out),
        Some(("compare", args)) => command_compare(args, out),
        Some(("dependency", args)) => command_dependency(args, out),
        Some(("build-order", args)) => command_build_order(args, out),
        Some((command, _)) => Err(DordError::InvalidSubCommand(command.to_string())),
        None => {
            app().print_help()?;
            Ok(())
        }
    }
}

fn required_str<'a>(args: &'a ArgMatches, name: &'static str) -> Result<&'a str> {
    args.value_of(name)
        .ok_or(DordError::MissingArgument(name))
}

fn parse_version(s: &str) -> Result<PackageVersion> {
    Ok(PackageVersion::parse(s).map_err(DebianError::from)?)
}

fn command_version(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let s = required_str(args, "input")?;

    let version = if args.is_present("strict") {
        PackageVersion::parse_strict(s).map_err(DebianError::from)?
    } else {
        parse_version(s)?
    };

    writeln!(out, "epoch: {}", version.epoch())?;
    writeln!(out, "upstream_version: {}", version.upstream_version())?;
    writeln!(
        out,
        "debian_revision: {}",
        version.debian_revision().unwrap_or("")
    )?;
    writeln!(out, "canonical: {}", version)?;
    writeln!(out, "comparable: {:?}", version.comparable_string())?;

    Ok(())
}

fn command_compare(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let a = parse_version(required_str(args, "a")?)?;
    let b = parse_version(required_str(args, "b")?)?;

    let symbol = match a.compare_precedence(&b) {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };

    writeln!(out, "{}", symbol)?;

    Ok(())
}

fn command_dependency(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let dependency =
        Dependency::parse(required_str(args, "expression")?).map_err(DebianError::from)?;

    let arch = args
        .value_of("arch")
        .map(Architecture::parse)
        .transpose()
        .map_err(DebianError::from)?;

    let json = args.is_present("json");

    match (arch, json) {
        (Some(arch), true) => {
            serde_json::to_writer_pretty(&mut *out, &dependency.get_possibilities(&arch))?;
            writeln!(out)?;
        }
        (Some(arch), false) => {
            for possibility in dependency.get_possibilities(&arch) {
                writeln!(out, "{}", possibility)?;
            }
        }
        (None, true) => {
            serde_json::to_writer_pretty(&mut *out, &dependency)?;
            writeln!(out)?;
        }
        (None, false) => {
            for relation in dependency.relations() {
                writeln!(out, "{}", relation)?;
            }
        }
    }

    Ok(())
}

fn command_build_order(args: &ArgMatches, out: &mut impl Write) -> Result<()> {
    let arch = Architecture::parse(required_str(args, "arch")?).map_err(DebianError::from)?;
    let path = args
        .value_of_os("sources")
        .ok_or(DordError::MissingArgument("sources"))?;

    let reader = std::io::BufReader::new(std::fs::File::open(path)?);

    let sources = ControlParagraphReader::new(reader)
        .map(|paragraph| SourcePackage::from_paragraph(&paragraph?))
        .collect::<std::result::Result<Vec<_>, DebianError>>()?;

    info!(
        "computing build order of {} source packages for {}",
        sources.len(),
        arch
    );

    for name in source_build_order(&sources, &arch)? {
        writeln!(out, "{}", name)?;
    }

    Ok(())
}
