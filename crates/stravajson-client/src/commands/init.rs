//! `stravajson init`: save credentials and write a starter `.env`.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use stravajson_api::{DEFAULT_BASE_URL, default_token_path};
use tracing::info;

use crate::cli::InitArgs;
use crate::config::vars;
use crate::credentials::CredentialStore;
use crate::error::{ClientError, ClientResult};

const SECRET_PROMPT: &str = "Your Strava CLIENT_SECRET: ";

/// Runs `init` against the terminal.
pub fn run(args: InitArgs, store: &CredentialStore) -> ClientResult<()> {
    let stdin = io::stdin();
    let hide_secret = stdin.is_terminal();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    init(
        args.client_id,
        &mut input,
        &mut output,
        hide_secret,
        store,
        &args.env_file,
        &default_token_path(),
    )
}

/// Prompts for missing values, stores them and writes the env file.
///
/// With `hide_secret` the client secret is read from the terminal without
/// echo instead of from `input`.
pub fn init<R: BufRead, W: Write>(
    client_id: Option<String>,
    input: &mut R,
    output: &mut W,
    hide_secret: bool,
    store: &CredentialStore,
    env_file: &Path,
    token_path: &Path,
) -> ClientResult<()> {
    let client_id = match client_id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => id,
        _ => prompt(input, output, "Your Strava CLIENT_ID: ")?,
    };
    let client_secret = if hide_secret {
        rpassword::prompt_password(SECRET_PROMPT)?.trim().to_string()
    } else {
        prompt(input, output, SECRET_PROMPT)?
    };

    if client_id.is_empty() || client_secret.is_empty() {
        return Err(ClientError::config(
            "both client_id and client_secret are required",
        ));
    }

    store.save(&client_id, &client_secret)?;

    let env = format!(
        "{}={}\n{}={}\n{}=true\n",
        vars::BASE_URL,
        DEFAULT_BASE_URL,
        vars::TOKENS_FILE,
        token_path.display(),
        vars::OPEN_BROWSER,
    );
    fs::write(env_file, env)?;
    info!(env_file = %env_file.display(), "wrote environment file");

    writeln!(
        output,
        "Saved credentials to {} and wrote minimal {} with {}={}",
        store.path().display(),
        env_file.display(),
        vars::TOKENS_FILE,
        token_path.display()
    )?;
    Ok(())
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> ClientResult<String> {
    write!(output, "{}", label)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
