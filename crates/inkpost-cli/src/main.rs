//! inkpost - command-line client for inkpost blog servers.
//!
//! Lists and reads posts, logs in and out, and publishes, edits or deletes
//! posts with the saved login token.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use inkpost_core::auth::{open_storage, TokenClaims};
use inkpost_core::models::{
    Author, LoginResponse, MessageResponse, Post, PostPayload, UploadResponse,
};
use inkpost_core::utils::pad_display;
use inkpost_core::{ApiClient, AuthStore, Config, PageMessages, PostLoader};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Column widths for the post list
const ID_WIDTH: usize = 6;
const DATE_WIDTH: usize = 13;
const AUTHOR_WIDTH: usize = 16;
const TITLE_WIDTH: usize = 48;

/// Excerpt length under each title in the post list
const EXCERPT_LENGTH: usize = 72;

#[derive(Parser, Debug)]
#[command(name = "inkpost", version, about = "Read and publish posts on an inkpost blog server")]
struct Cli {
    /// Server API base URL, e.g. http://localhost:8080/api/v1
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List posts, newest first
    Posts {
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Show a single post
    Show { id: String },
    /// Log in and save the token
    Login {
        #[arg(long)]
        username: Option<String>,
    },
    /// Forget the saved token
    Logout,
    /// Show who is logged in
    Status,
    /// Create an account
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// Publish a new post
    Create(PostArgs),
    /// Replace the title, content and cover of a post
    Update {
        id: String,
        #[command(flatten)]
        post: PostArgs,
    },
    /// Delete a post
    Delete { id: String },
    /// Show an author's profile
    Author { id: String },
    /// Upload a cover image and print its URL
    Upload { path: PathBuf },
}

#[derive(Args, Debug)]
struct PostArgs {
    #[arg(long)]
    title: String,
    /// Post body
    #[arg(long, required_unless_present = "content_file", conflicts_with = "content_file")]
    content: Option<String>,
    /// Read the post body from a file
    #[arg(long)]
    content_file: Option<PathBuf>,
    #[arg(long, default_value = "")]
    cover_image_url: String,
}

impl PostArgs {
    fn into_payload(self) -> Result<PostPayload> {
        let content = match (self.content, self.content_file) {
            (Some(content), _) => content,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            (None, None) => anyhow::bail!("Either --content or --content-file is required"),
        };
        Ok(PostPayload {
            title: self.title,
            content,
            cover_image_url: self.cover_image_url,
        })
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Everything a command needs: settings, the HTTP client, and the token.
struct App {
    config: Config,
    api: ApiClient,
    auth: AuthStore,
    json: bool,
}

impl App {
    fn new(api_url: Option<String>, json: bool) -> Result<Self> {
        let mut config = Config::load()?;
        if let Some(url) = api_url {
            config.api_base_url = url;
        }
        debug!(api = %config.api_base_url, storage = ?config.storage, "Config loaded");

        let api = ApiClient::from_config(&config)?;
        let auth = AuthStore::init(open_storage(&config));

        Ok(Self {
            config,
            api,
            auth,
            json,
        })
    }

    fn require_token(&self) -> Result<String> {
        self.auth
            .token()
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `inkpost login` first."))
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let app = App::new(cli.api_url, cli.json)?;
    info!(command = ?cli.command, "Running command");

    match cli.command {
        Command::Posts { page, limit } => list_posts(&app, page, limit).await?,
        Command::Show { id } => return show_post(&app, &id).await,
        Command::Login { username } => login(&app, username).await?,
        Command::Logout => {
            app.auth.logout();
            println!("Logged out.");
        }
        Command::Status => status(&app),
        Command::Signup { username, email } => signup(&app, &username, &email).await?,
        Command::Create(args) => {
            let token = app.require_token()?;
            let response = app.api.create_post(&args.into_payload()?, &token).await?;
            let post: Post = response.json()?;
            println!("Created post {}: {}", post.id, post.title);
        }
        Command::Update { id, post } => {
            let token = app.require_token()?;
            let response = app.api.update_post(&id, &post.into_payload()?, &token).await?;
            let post: Post = response.json()?;
            println!("Updated post {}: {}", post.id, post.title);
        }
        Command::Delete { id } => {
            let token = app.require_token()?;
            let response = app.api.delete_post(&id, &token).await?;
            let ack: MessageResponse = response.json()?;
            println!("{}", ack.message);
        }
        Command::Author { id } => {
            let author: Author = app.api.get_author(&id).await?.json()?;
            if app.json {
                app.print_json(&author)?;
            } else {
                println!("{} (#{})", author.username, author.id);
                if !author.bio.is_empty() {
                    println!("{}", author.bio);
                }
            }
        }
        Command::Upload { path } => upload(&app, &path).await?,
    }

    Ok(ExitCode::SUCCESS)
}

async fn list_posts(app: &App, page: i64, limit: i64) -> Result<()> {
    let response = app.api.get_posts(page, limit).await?;
    if app.json {
        return app.print_json(&response.data());
    }

    let posts: Vec<Post> = response.json()?;
    if posts.is_empty() {
        println!("No posts on page {}.", page);
        return Ok(());
    }

    println!(
        "{} {} {} {}",
        pad_display("ID", ID_WIDTH),
        pad_display("DATE", DATE_WIDTH),
        pad_display("AUTHOR", AUTHOR_WIDTH),
        "TITLE"
    );
    for post in &posts {
        println!(
            "{} {} {} {}",
            pad_display(&post.id.to_string(), ID_WIDTH),
            pad_display(&post.display_date(), DATE_WIDTH),
            pad_display(post.author_name(), AUTHOR_WIDTH),
            pad_display(&post.title, TITLE_WIDTH).trim_end()
        );
        let excerpt = post.excerpt(EXCERPT_LENGTH);
        if !excerpt.is_empty() {
            println!("{}{}", " ".repeat(ID_WIDTH + 1), excerpt);
        }
    }
    Ok(())
}

/// Load one post through the page loader; failures exit with the page status.
async fn show_post(app: &App, id: &str) -> Result<ExitCode> {
    let loader = PostLoader::new(
        app.api.clone(),
        PageMessages::for_locale(app.config.locale),
    );

    let page = match loader.load(id).await {
        Ok(page) => page,
        Err(e) => {
            if app.json {
                app.print_json(&e)?;
            } else {
                eprintln!("{} {}", e.status, e.message);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    match page.typed() {
        Ok(post) if !app.json => {
            println!("{}", post.title);
            println!("by {} on {}", post.author_name(), post.display_date());
            if !post.cover_image_url.is_empty() {
                println!("cover: {}", post.cover_image_url);
            }
            println!();
            println!("{}", post.content);
        }
        _ => app.print_json(&page)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Log in and hand the returned token to the auth store, which persists it.
async fn login(app: &App, username: Option<String>) -> Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt_username(app.config.last_username.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    eprintln!("Authenticating...");
    let response = app.api.login(&username, &password).await?;
    let login: LoginResponse = response.json()?;
    finish_login(&app.auth, login.token, || Config::remember_username(&username));

    if app.auth.is_persistent() {
        println!("Logged in as {}.", username);
    } else {
        println!("Logged in as {} (token not saved: no usable storage).", username);
    }
    Ok(())
}

/// Store the new token, then record the username for the next prompt. The
/// second step is best-effort: the login stands even if it fails.
fn finish_login<F>(auth: &AuthStore, token: String, remember: F)
where
    F: FnOnce() -> Result<()>,
{
    auth.set_token(Some(token));
    if let Err(e) = remember() {
        warn!(error = %e, "Failed to remember username");
    }
}

fn status(app: &App) {
    println!("Server:  {}", app.config.api_base_url);
    println!("Storage: {:?}", app.config.storage);

    let Some(token) = app.auth.token() else {
        println!("Not logged in.");
        return;
    };

    match TokenClaims::decode(&token) {
        Ok(claims) => {
            let now = Utc::now();
            println!("Logged in as {} (user #{}).", claims.usn, claims.sub);
            if let Some(expires_at) = claims.expires_at() {
                if claims.is_expired_at(now) {
                    println!("Token expired at {}; the server will reject it.", expires_at);
                } else if let Some(minutes) = claims.minutes_until_expiry(now) {
                    println!("Token expires at {} ({} min left).", expires_at, minutes);
                }
            }
        }
        Err(e) => {
            debug!(error = %e, "Token claims unreadable");
            println!("Logged in.");
        }
    }
}

async fn signup(app: &App, username: &str, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let response = app.api.signup(username, email, &password).await?;
    let ack: MessageResponse = response.json()?;
    println!("{}", ack.message);
    Ok(())
}

async fn upload(app: &App, path: &Path) -> Result<()> {
    let token = app.require_token()?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload");

    let response = app.api.upload_image(filename, bytes, &token).await?;
    let upload: UploadResponse = response.json()?;
    println!("{}", upload.url);
    Ok(())
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    let username = username.trim();

    match (username.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => anyhow::bail!("Username is required"),
        (false, _) => Ok(username.to_string()),
    }
}
