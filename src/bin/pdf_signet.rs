//! Command-line signing tool.
//!
//! Signs a PDF with a PKCS#12 identity and writes the result next to the
//! input, or to an explicit output path. The password comes from the
//! `PDF_SIGNET_PASSWORD` environment variable or the fourth argument (the
//! variable keeps it out of shell history and process listings).
//!
//! ```text
//! pdf_signet <input.pdf> <identity.p12> [output.pdf] [password]
//!     [--page N] [--reason TEXT] [--location TEXT] [--digest SHA-256]
//! ```

use pdf_signet::{DigestAlgorithm, PdfSigner, SigningConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {}", message);
            eprintln!(
                "usage: pdf_signet <input.pdf> <identity.p12> [output.pdf] [password] \
                 [--page N] [--reason TEXT] [--location TEXT] [--digest NAME]"
            );
            return ExitCode::FAILURE;
        },
    };

    match run(parsed) {
        Ok(output) => {
            println!("signed document written to {}", output);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        },
    }
}

struct Args {
    input: String,
    identity: String,
    output: String,
    password: String,
    config: SigningConfig,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut positional: Vec<&String> = Vec::new();
    let mut config = SigningConfig::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if let Some(flag) = arg.strip_prefix("--") {
            let value = args
                .get(i + 1)
                .ok_or_else(|| format!("--{} needs a value", flag))?;
            match flag {
                "page" => {
                    let page: usize = value
                        .parse()
                        .map_err(|_| format!("--page expects a number, got {:?}", value))?;
                    config = config.with_page(page);
                },
                "reason" => config = config.with_reason(value.clone()),
                "location" => config = config.with_location(value.clone()),
                "contact" => config = config.with_contact(value.clone()),
                "field" => config = config.with_field_name(value.clone()),
                "digest" => {
                    let algorithm: DigestAlgorithm = value.parse().map_err(|e| format!("{}", e))?;
                    config = config.with_digest_algorithm(algorithm);
                },
                other => return Err(format!("unknown flag --{}", other)),
            }
            i += 2;
        } else {
            positional.push(arg);
            i += 1;
        }
    }

    if positional.len() < 2 {
        return Err("need an input PDF and an identity container".to_string());
    }
    let input = positional[0].clone();
    let identity = positional[1].clone();
    let output = positional
        .get(2)
        .map(|s| s.to_string())
        .unwrap_or_else(|| default_output(&input));
    let password = positional
        .get(3)
        .map(|s| s.to_string())
        .or_else(|| std::env::var("PDF_SIGNET_PASSWORD").ok())
        .ok_or_else(|| {
            "no password: set PDF_SIGNET_PASSWORD or pass it as the fourth argument".to_string()
        })?;

    Ok(Args { input, identity, output, password, config })
}

/// `contract.pdf` -> `contract-signed.pdf`
fn default_output(input: &str) -> String {
    match input.strip_suffix(".pdf") {
        Some(stem) => format!("{}-signed.pdf", stem),
        None => format!("{}-signed", input),
    }
}

fn run(args: Args) -> pdf_signet::Result<String> {
    let container = std::fs::read(&args.identity)?;
    let signer = PdfSigner::new(args.config);
    signer.sign_file(&args.input, &args.output, &container, &args.password)?;
    Ok(args.output)
}
