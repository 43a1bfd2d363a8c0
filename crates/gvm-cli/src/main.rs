//! gvm command-line launcher
//!
//! Loads `MAINCLASS` from the class path and runs its
//! `public static void main(String[])` to completion.

mod classpath;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use classpath::ClassPath;
use gvm_core::vm::DEFAULT_MAX_FRAMES;
use gvm_core::{Vm, VmOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

const VERSION: &str = "gvm 0.1.8.0";

#[derive(Parser, Debug)]
#[command(name = "gvm")]
#[command(about = "Run a class file on the gvm interpreter", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Directories, JAR and ZIP archives to search for classes
    #[arg(long = "classpath", visible_alias = "cp", value_name = "PATH")]
    classpath: Option<String>,

    /// Searched for core classes before the built-in ones
    #[arg(long = "bootclasspath", value_name = "PATH")]
    bootclasspath: Option<String>,

    /// Maximum frames per thread
    #[arg(long = "xss", value_name = "FRAMES", default_value_t = DEFAULT_MAX_FRAMES)]
    xss: usize,

    /// Log class loading and native binding
    #[arg(short, long)]
    verbose: bool,

    /// Log every executed instruction
    #[arg(long)]
    trace: bool,

    /// Write opcode and call counts as JSON
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Stop after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout: Option<u64>,

    /// Print version information and exit
    #[arg(short = 'V', long)]
    version: bool,

    /// Class whose main method is run
    #[arg(value_name = "MAINCLASS")]
    main_class: Option<String>,

    /// Arguments passed to main
    #[arg(trailing_var_arg = true, value_name = "ARGS")]
    args: Vec<String>,
}

const VALUE_FLAGS: &[&str] = &["--classpath", "--cp", "--bootclasspath", "--xss", "--profile", "--timeout"];

/// Rewrite single-dash launcher flags (`-cp`, `-Xss512`) into their long
/// forms and separate the program arguments with `--`
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut args = args.into_iter();
    let mut out: Vec<String> = args.next().into_iter().collect();
    while let Some(arg) = args.next() {
        let flag = match arg.as_str() {
            "-cp" | "-classpath" => "--classpath".to_string(),
            "-bootclasspath" => "--bootclasspath".to_string(),
            "-verbose" | "-verbose:class" | "-verbose:jni" => "--verbose".to_string(),
            "-version" => "--version".to_string(),
            "-Xdebug:instr" => "--trace".to_string(),
            other => match other.strip_prefix("-Xss") {
                Some(frames) if !frames.is_empty() => {
                    out.push("--xss".to_string());
                    out.push(frames.to_string());
                    continue;
                }
                _ if !other.starts_with('-') => {
                    out.push(other.to_string());
                    out.push("--".to_string());
                    out.extend(args);
                    break;
                }
                _ => other.to_string(),
            },
        };
        let takes_value = VALUE_FLAGS.contains(&flag.as_str());
        out.push(flag);
        if takes_value {
            out.extend(args.next());
        }
    }
    out
}

fn init_logging(cli: &Cli) {
    let level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

/// `--classpath`, then `CLASSPATH`, then the working directory
fn resolve_classpath(option: Option<&str>) -> String {
    option
        .map(str::to_string)
        .or_else(|| std::env::var("CLASSPATH").ok().filter(|cp| !cp.is_empty()))
        .unwrap_or_else(|| ".".to_string())
}

fn write_profile(vm: &Vm, path: &Path) -> anyhow::Result<()> {
    let Some(profile) = vm.profile() else {
        return Ok(());
    };
    let json = profile.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write profile to {}", path.display()))?;
    log::info!("wrote profile to {}", path.display());
    Ok(())
}

fn run(cli: &Cli, main_class: &str) -> anyhow::Result<()> {
    let classpath = ClassPath::parse(&resolve_classpath(cli.classpath.as_deref()));
    if classpath.is_empty() {
        log::warn!("class path has no readable entries");
    }
    log::debug!("class path: {}", gvm_core::ClassSource::describe(&classpath));

    let options = VmOptions {
        max_frames: cli.xss,
        trace_instructions: cli.trace,
        profile: cli.profile.is_some(),
        timeout: cli.timeout.map(Duration::from_millis),
        abort: None,
    };
    let mut builder = Vm::builder().options(options);
    if let Some(boot) = &cli.bootclasspath {
        builder = builder.boot_source(ClassPath::parse(boot));
    }
    let vm = builder.source(classpath).build();

    let class_name = main_class.replace('.', "/");
    let result = vm
        .run_main(&class_name, &cli.args)
        .with_context(|| format!("failed to run {}", main_class));
    if let Some(path) = &cli.profile {
        write_profile(&vm, path)?;
    }
    result
}

fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args()));
    if cli.version {
        println!("{}", VERSION);
        return;
    }
    init_logging(&cli);

    let Some(main_class) = cli.main_class.as_deref() else {
        let _ = Cli::command().print_help();
        std::process::exit(2);
    };
    if let Err(e) = run(&cli, main_class) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_launcher_flags() {
        let normalized = normalize_args(args(&["gvm", "-cp", "lib", "-Xss512", "-verbose:class", "Main", "-cp"]));
        assert_eq!(
            normalized,
            args(&["gvm", "--classpath", "lib", "--xss", "512", "--verbose", "Main", "--", "-cp"])
        );
    }

    #[test]
    fn test_program_arguments_pass_through() {
        let cli = Cli::parse_from(normalize_args(args(&["gvm", "--xss", "64", "app.Main", "-v", "x"])));
        assert_eq!(cli.xss, 64);
        assert!(!cli.verbose);
        assert_eq!(cli.main_class.as_deref(), Some("app.Main"));
        assert_eq!(cli.args, args(&["-v", "x"]));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(args(&["gvm"]));
        assert_eq!(cli.xss, DEFAULT_MAX_FRAMES);
        assert!(cli.main_class.is_none());
        assert_eq!(resolve_classpath(Some("a:b")), "a:b");
    }
}
