use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dpop_handshake::services::dpop::{KeyPair, ProofBuilder, build_proof};
use reqwest::StatusCode;
use tracing_subscriber::EnvFilter;

/// Client-side tooling for the DPoP handshake (P-256 / ES256).
///
/// - keygen: write a PKCS#8 PEM private key and print its thumbprint (jkt)
/// - proof: build a single DPoP proof for a given method/URL/nonce
/// - handshake: POST /nonce -> build proof -> POST /token against a server
#[derive(Parser, Debug)]
#[command(name = "dpop-gen", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new P-256 private key (PKCS#8 PEM).
    Keygen {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Build a DPoP proof JWT.
    Proof {
        /// Path to the client's P-256 private key in PEM (PKCS#8)
        #[arg(long, value_name = "FILE")]
        key: PathBuf,

        /// Full request URL used as htu (e.g. http://localhost:8001/token)
        #[arg(long)]
        url: String,

        /// HTTP method (htm)
        #[arg(long, default_value = "POST")]
        method: String,

        /// Nonce previously issued by POST /nonce. Empty proofs are rejected.
        #[arg(long, default_value = "")]
        nonce: String,

        /// Override iat (unix seconds). Default: now.
        #[arg(long)]
        iat: Option<i64>,

        /// Override jti. Default: random UUID v4.
        #[arg(long)]
        jti: Option<String>,

        /// Print only the DPoP token (no extra lines)
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },

    /// Run the full nonce -> proof -> token exchange.
    Handshake {
        /// Server base URL (e.g. http://localhost:8001)
        #[arg(long)]
        server: String,

        /// Existing private key. Default: a fresh ephemeral key.
        #[arg(long, value_name = "FILE")]
        key: Option<PathBuf>,
    },
}

fn load_key(path: &PathBuf) -> Result<KeyPair> {
    let pem = fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    KeyPair::from_pkcs8_pem(&pem).context("key file is not a P-256 PKCS#8 PEM")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Keygen { out } => keygen(out),
        Command::Proof {
            key,
            url,
            method,
            nonce,
            iat,
            jti,
            quiet,
        } => {
            let key = load_key(&key)?;
            let mut builder = ProofBuilder::new(&key);
            if let Some(iat) = iat {
                builder = builder.with_iat(iat);
            }
            if let Some(jti) = jti {
                builder = builder.with_jti(jti);
            }
            let proof = builder.build(key.jwk(), &nonce, &method, &url)?;

            if quiet {
                println!("{}", proof);
                return Ok(());
            }

            println!("DPoP: {}", proof);
            println!("jkt (cnf.jkt): {}", key.thumbprint());
            println!("iat: {}", proof.claims.iat);
            println!("jti: {}", proof.claims.jti);
            Ok(())
        }
        Command::Handshake { server, key } => {
            let key = match key {
                Some(path) => load_key(&path)?,
                None => KeyPair::generate(),
            };
            handshake(&server, &key).await
        }
    }
}

fn keygen(out: PathBuf) -> Result<()> {
    let key = KeyPair::generate();
    let pem = key.to_pkcs8_pem()?;
    fs::write(&out, pem).with_context(|| format!("failed to write {}", out.display()))?;
    println!("wrote {}", out.display());
    println!("jkt (cnf.jkt): {}", key.thumbprint());
    Ok(())
}

async fn handshake(server: &str, key: &KeyPair) -> Result<()> {
    let base = server.trim_end_matches('/');
    let nonce_url = format!("{}/nonce", base);
    let token_url = format!("{}/token", base);
    let client = reqwest::Client::new();

    // A nonce can be superseded or expire between the two calls; one retry
    // with a fresh one is enough.
    for attempt in 1..=2 {
        let resp = client
            .post(&nonce_url)
            .header("jkt", key.thumbprint())
            .send()
            .await
            .context("POST /nonce failed")?;
        if resp.status() != StatusCode::CREATED {
            bail!("POST /nonce returned {}", resp.status());
        }
        let nonce = resp
            .headers()
            .get("dpop-nonce")
            .and_then(|v| v.to_str().ok())
            .context("POST /nonce response has no DPoP-Nonce header")?
            .to_string();
        tracing::debug!(attempt, nonce = %nonce, "received nonce");

        let proof = build_proof(key, key.jwk(), &nonce, "POST", &token_url)?;
        let resp = client
            .post(&token_url)
            .header("DPoP", proof.as_str())
            .send()
            .await
            .context("POST /token failed")?;

        match resp.status() {
            StatusCode::OK => {
                let body: serde_json::Value = resp.json().await?;
                println!("jkt (cnf.jkt): {}", key.thumbprint());
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }
            StatusCode::UNAUTHORIZED if attempt == 1 => {
                tracing::warn!("token request rejected; retrying with a fresh nonce");
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                bail!("POST /token returned {}: {}", status, body);
            }
        }
    }

    bail!("token request rejected twice")
}
