//! Inspect and modify file attributes on the local disk through an attribute-caching session.
use std::path::PathBuf;
use std::sync::Arc;

use attr_cache_fs::fs::host::HostFs;
use attr_cache_fs::fs::{
    AttrValue, CacheSettings, CachingFs, CopyOptions, FsError, FsRegistry, RegistryError,
};
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{debug, error};

mod app_config;
mod term;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(
    version,
    about = "Read and write file attributes through a time-bounded attribute cache."
)]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to an attr-cache-fs config TOML."
    )]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the attributes of a file.
    Stat {
        path: String,

        /// Attribute selector, such as `*`, `posix:*` or `lastModifiedTime`.
        #[arg(short, long, default_value = "*")]
        attributes: String,

        /// Read the attributes this many times through the same cached path.
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
    },

    /// Write one attribute and print its refreshed value.
    Set {
        path: String,

        /// Attribute name, such as `lastModifiedTime` or `posix:permissions`.
        name: String,

        /// New value. Times take epoch millis or an RFC 3339 time such as `1970-01-01T19:34:27Z`.
        value: String,
    },

    /// Copy a file.
    Copy {
        source: String,
        target: String,

        #[arg(short, long, help = "Carry the source's attributes over to the copy.")]
        preserve: bool,

        #[arg(long, help = "Overwrite the target if it exists.")]
        replace: bool,
    },

    /// Move or rename a file.
    Mv {
        source: String,
        target: String,

        #[arg(short, long, help = "Carry the source's attributes over to the target.")]
        preserve: bool,

        #[arg(long, help = "Overwrite the target if it exists.")]
        replace: bool,

        #[arg(long, help = "Fail unless the move is atomic.")]
        atomic: bool,
    },

    /// Report whether a file is hidden.
    Hidden { path: String },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

impl From<CliError> for i32 {
    fn from(e: CliError) -> Self {
        match e {
            CliError::Registry(e) => e.into(),
            CliError::Fs(e) => e.into(),
        }
    }
}

fn copy_options(preserve: bool, replace: bool, atomic: bool) -> CopyOptions {
    let mut options = CopyOptions::empty();
    options.set(CopyOptions::COPY_ATTRIBUTES, preserve);
    options.set(CopyOptions::REPLACE_EXISTING, replace);
    options.set(CopyOptions::ATOMIC_MOVE, atomic);
    options
}

fn run(fs: &CachingFs<HostFs>, command: Command) -> Result<(), FsError> {
    match command {
        Command::Stat {
            path,
            attributes,
            repeat,
        } => {
            let path = fs.path(&path, &[])?;
            for round in 0..repeat.max(1) {
                let map = fs.read_attributes_map(&path, &attributes)?;
                if round > 0 {
                    println!();
                }
                for (key, value) in &map {
                    println!("{key} = {value}");
                }
            }
        }
        Command::Set { path, name, value } => {
            let path = fs.path(&path, &[])?;
            let value = AttrValue::parse_for_attribute(&name, &value)?;
            fs.set_attribute(&path, &name, value)?;
            for (key, value) in &fs.read_attributes_map(&path, &name)? {
                println!("{key} = {value}");
            }
        }
        Command::Copy {
            source,
            target,
            preserve,
            replace,
        } => {
            let source = fs.path(&source, &[])?;
            let target = fs.path(&target, &[])?;
            fs.copy(&source, &target, copy_options(preserve, replace, false))?;
        }
        Command::Mv {
            source,
            target,
            preserve,
            replace,
            atomic,
        } => {
            let source = fs.path(&source, &[])?;
            let target = fs.path(&target, &[])?;
            fs.rename(&source, &target, copy_options(preserve, replace, atomic))?;
        }
        Command::Hidden { path } => {
            let path = fs.path(&path, &[])?;
            println!("{}", fs.is_hidden(&path)?);
        }
    }
    Ok(())
}

fn open_session(
    registry: &Arc<FsRegistry<HostFs>>,
    config: &Config,
) -> Result<Arc<CachingFs<HostFs>>, CliError> {
    let settings = CacheSettings::default().with_flush_interval(config.cache.flush_interval());
    Ok(registry.wrapping(HostFs::new(), settings)?)
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let config = Config::load_or_create(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    if let Err(e) = Trc::default().init() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }
    debug!(config = ?config, "Loaded configuration.");

    let registry = FsRegistry::<HostFs>::new();
    let result = open_session(&registry, &config).and_then(|fs| {
        let outcome = run(&fs, args.command).map_err(CliError::from);
        if let Err(e) = fs.close() {
            error!("Failed to close session: {e}");
        }
        outcome
    });

    if let Err(e) = result {
        let message = e.to_string();
        error!(errno = i32::from(e), "{message}");
        std::process::exit(1);
    }
}
