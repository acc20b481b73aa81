#![forbid(unsafe_code)]
//! `sesame` command line: encrypt files into one archive, decrypt it back.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sesame::{
    AeadAlg, Confirm, DEFAULT_COMPRESSION_LEVEL, DecryptOptions, EncryptOptions, KeyRequest,
    Mode, TerminalPrompt, create_key, decrypt_file, encrypt_files, resolve_keys,
    verify_input_files, write_key,
};

#[derive(Parser, Debug)]
#[command(
    name = "sesame",
    version,
    about = "Config file encryption and decryption"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt one or more files
    Encrypt(EncryptArgs),
    /// Decrypt a file created with sesame
    Decrypt(DecryptArgs),
    /// Generate a new key file
    Keygen(KeygenArgs),
}

#[derive(Args, Debug)]
struct EncryptArgs {
    /// Encrypted file to be created
    output: PathBuf,

    /// Files or directories to be encrypted
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Path to the encryption key
    #[arg(short = 'k', long = "keyfile")]
    keyfile: Option<PathBuf>,

    /// Force overwrite of an existing encrypted file
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// zstd compression level
    #[arg(short = 'l', long = "level", default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    level: i32,

    /// Algorithm for a key created on the fly
    #[arg(short = 'a', long, value_enum, default_value_t = AlgChoice::Xchacha)]
    alg: AlgChoice,
}

#[derive(Args, Debug)]
struct DecryptArgs {
    /// File to be decrypted
    input: PathBuf,

    /// Path to the encryption key
    #[arg(short = 'k', long = "keyfile")]
    keyfile: Option<PathBuf>,

    /// Force overwrite of existing decrypted files
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Extract files into a specific directory (default: current directory)
    #[arg(short = 'O', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Search for keys from the current directory and try all of them
    #[arg(short = 'T', long = "try-all")]
    try_all: bool,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    /// Key file to write. If omitted, a new sesame*.key file is created in the current directory.
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    #[arg(short = 'a', long, value_enum, default_value_t = AlgChoice::Xchacha)]
    alg: AlgChoice,

    /// Overwrite the key file if it exists
    #[arg(short = 'f', long = "force")]
    force: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AlgChoice {
    Xchacha,
    Aes,
}

impl From<AlgChoice> for AeadAlg {
    fn from(v: AlgChoice) -> Self {
        match v {
            AlgChoice::Xchacha => AeadAlg::XChaCha20Poly1305,
            AlgChoice::Aes => AeadAlg::Aes256GcmSiv,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let res = match cli.cmd {
        Command::Encrypt(a) => cmd_encrypt(a),
        Command::Decrypt(a) => cmd_decrypt(a),
        Command::Keygen(a) => cmd_keygen(a),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("cannot determine current directory")
}

fn report_created(created: Option<&Path>) {
    if let Some(path) = created {
        let name = path.file_name().unwrap_or(path.as_os_str());
        eprintln!("Encryption key created at {}", name.to_string_lossy());
    }
}

fn cmd_encrypt(a: EncryptArgs) -> Result<()> {
    verify_input_files(&a.inputs, None)?;

    let prompt = TerminalPrompt;
    let root = current_dir()?;
    let resolved = resolve_keys(
        &KeyRequest {
            keyfile: a.keyfile.as_deref(),
            root_dir: &root,
            mode: Mode::Encrypt,
            try_all: false,
            alg: a.alg.into(),
        },
        &prompt,
    )?;
    report_created(resolved.created.as_deref());
    if resolved.keys.is_empty() {
        anyhow::bail!(sesame::SesameError::NoKeys);
    }

    let mut force = a.force;
    if !force && a.output.exists() {
        if !prompt.confirm_overwrite(&a.output) {
            return Ok(());
        }
        force = true;
    }

    let opts = EncryptOptions {
        force,
        compression_level: a.level,
        ..Default::default()
    };
    let out = encrypt_files(&a.inputs, &a.output, &resolved.keys, &opts)
        .with_context(|| "encryption failed")?;

    eprintln!("Wrote {}", out.display());
    Ok(())
}

fn cmd_decrypt(a: DecryptArgs) -> Result<()> {
    verify_input_files(&[&a.input], None)?;

    let prompt = TerminalPrompt;
    let root = current_dir()?;
    let resolved = resolve_keys(
        &KeyRequest {
            keyfile: a.keyfile.as_deref(),
            root_dir: &root,
            mode: Mode::Decrypt,
            try_all: a.try_all,
            alg: AeadAlg::default(),
        },
        &prompt,
    )?;
    report_created(resolved.created.as_deref());
    if resolved.keys.is_empty() {
        anyhow::bail!(sesame::SesameError::NoKeys);
    }

    let opts = DecryptOptions {
        force: a.force,
        try_all: a.try_all,
        output_dir: a.output_dir.unwrap_or(root),
        scratch_dir: None,
    };
    let report = decrypt_file(&a.input, &resolved.keys, &prompt, &opts)
        .with_context(|| "decryption failed")?;

    for path in &report.written {
        println!("{}", path.display());
    }
    for path in &report.skipped {
        eprintln!("Skipped existing {}", path.display());
    }
    Ok(())
}

fn cmd_keygen(a: KeygenArgs) -> Result<()> {
    let alg = AeadAlg::from(a.alg);
    let path = match a.out {
        Some(path) => {
            let key = sesame::Key::generate(alg)?;
            write_key(&path, &key, a.force)?;
            path
        }
        None => create_key(&current_dir()?, alg)?.0,
    };
    eprintln!("Wrote {}", path.display());
    Ok(())
}
