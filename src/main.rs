use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use letterpress::{DocumentConfig, Settings};

#[derive(Parser)]
#[command(name = "letterpress")]
#[command(about = "Convert Markdown files to letterhead PDFs")]
struct Cli {
    /// Input Markdown file
    input: PathBuf,

    /// Output file (defaults to input name with the extension for --emit)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Settings file overlaid on the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Add a title page before the content
    #[arg(long)]
    title_page: bool,

    /// Add a signature page after the content
    #[arg(long)]
    signature_page: bool,

    /// Leave e-signature anchor tokens off the signature page
    #[arg(long)]
    no_anchors: bool,

    /// Logo image for the header and title page
    #[arg(long)]
    logo: Option<PathBuf>,

    #[arg(long)]
    company: Option<String>,

    #[arg(long)]
    address: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    #[arg(long)]
    email: Option<String>,

    /// Footer text on every content page
    #[arg(long)]
    disclaimer: Option<String>,

    /// What to write
    #[arg(long, value_enum, default_value_t = Emit::Pdf)]
    emit: Emit,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Pdf,
    Html,
    Typst,
}

impl Emit {
    fn extension(self) -> &'static str {
        match self {
            Emit::Pdf => "pdf",
            Emit::Html => "html",
            Emit::Typst => "typ",
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn build_config(cli: &Cli) -> Result<DocumentConfig, letterpress::RenderError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::compiled_default(),
    };

    let head = &mut settings.letterhead;
    if let Some(company) = &cli.company {
        head.company = company.clone();
    }
    if let Some(address) = &cli.address {
        head.address = address.clone();
    }
    if let Some(phone) = &cli.phone {
        head.phone = phone.clone();
    }
    if let Some(email) = &cli.email {
        head.email = Some(email.clone());
    }

    let doc = &mut settings.document;
    if let Some(disclaimer) = &cli.disclaimer {
        doc.disclaimer = disclaimer.clone();
    }
    if let Some(logo) = &cli.logo {
        doc.logo = Some(logo.clone());
    }
    doc.title_page |= cli.title_page;
    doc.signature_page |= cli.signature_page;
    if cli.no_anchors {
        doc.signing_anchors = false;
    }
    if doc.asset_root.is_none() {
        doc.asset_root = cli.input.parent().map(PathBuf::from);
    }

    settings.document_config()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let markdown = match fs::read_to_string(&cli.input) {
        Ok(content) => content,
        Err(e) => fail(format!("reading {}: {}", cli.input.display(), e)),
    };

    let config = build_config(&cli).unwrap_or_else(|e| fail(e));

    let bytes = match cli.emit {
        Emit::Pdf => letterpress::render(&markdown, &config),
        Emit::Html => Ok(letterpress::markdown_to_html(&markdown).into_bytes()),
        Emit::Typst => letterpress::markdown_to_typst(&markdown, &config).map(String::into_bytes),
    }
    .unwrap_or_else(|e| fail(e));

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension(cli.emit.extension()));

    if let Err(e) = fs::write(&output, bytes) {
        fail(format!("writing {}: {}", output.display(), e));
    }

    println!("Created {}", output.display());
}
