use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use medsearch_api::identity::require_user;
use medsearch_api::library::{self, FolderOutcome, SaveOutcome};
use medsearch_api::{search_library, HttpApi, IdentityProvider, LibraryBackend, ThreadBackend};
use medsearch_session::{PaperChatSession, SearchSession, SessionPhase, SessionStore};
use medsearch_sources::SourceType;
use tracing::{info, warn};

use crate::config::Config;
use crate::render;

#[derive(Parser)]
#[command(name = "medsearch")]
#[command(version)]
#[command(about = "Ask questions against medical literature and get cited answers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question in a new thread, or follow up on an existing one
    Search {
        query: String,
        /// Follow up on this thread instead of starting a new one
        #[arg(long)]
        thread: Option<String>,
        /// pubmed or library
        #[arg(long)]
        source: Option<SourceType>,
        #[arg(long)]
        max_sources: Option<u32>,
        /// Return once the query is accepted instead of waiting for the answer
        #[arg(long)]
        no_wait: bool,
    },
    /// Search threads
    Thread {
        #[command(subcommand)]
        action: ThreadAction,
    },
    /// Saved papers
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Library folders
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },
    /// Chat about a saved paper
    Chat { source_id: String, message: String },
    /// Locally persisted session state
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
pub enum ThreadAction {
    /// Print a thread's answers and deduplicated sources
    Show { thread_id: String },
    List,
    Rename { thread_id: String, name: String },
    Delete { thread_id: String },
}

#[derive(Subcommand)]
pub enum LibraryAction {
    List {
        /// Only sources inside this folder
        #[arg(long)]
        path: Option<String>,
    },
    /// Fuzzy search over saved papers by title, authors, journal and more
    Search {
        query: String,
        /// Only sources inside this folder
        #[arg(long)]
        path: Option<String>,
    },
    /// Save a source cited in a thread, identified by pmid
    AddFromThread {
        thread_id: String,
        pmid: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    Move { source_id: String, new_path: String },
    Delete { source_id: String },
    /// Upload a PDF into the library
    Upload {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "/")]
        path: String,
    },
}

#[derive(Subcommand)]
pub enum FolderAction {
    List,
    Create {
        path: String,
        #[arg(long)]
        name: Option<String>,
    },
    Delete { path: String },
}

#[derive(Subcommand)]
pub enum SessionAction {
    Show,
    /// Forget the active thread, selections and chat history
    Reset,
}

struct App {
    config: Config,
    identity: Arc<dyn IdentityProvider>,
    api: Arc<HttpApi>,
    store: SessionStore,
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let identity = config.identity();
    let api = Arc::new(config.build_api(identity.clone())?);
    let store = SessionStore::hydrate(&config.session.path)
        .with_context(|| format!("loading session state from {}", config.session.path))?;
    let mut app = App { config, identity, api, store };

    match cli.command {
        Commands::Search { query, thread, source, max_sources, no_wait } => {
            search(&mut app, &query, thread, source, max_sources, no_wait).await
        }
        Commands::Thread { action } => thread(&mut app, action).await,
        Commands::Library { action } => library_cmd(&mut app, action).await,
        Commands::Folder { action } => folder(&app, action).await,
        Commands::Chat { source_id, message } => chat(&mut app, &source_id, &message).await,
        Commands::Session { action } => session(&mut app, action),
    }
}

async fn search(
    app: &mut App,
    query: &str,
    thread_id: Option<String>,
    source: Option<SourceType>,
    max_sources: Option<u32>,
    no_wait: bool,
) -> Result<()> {
    let source_type = source.unwrap_or_else(|| match thread_id.as_deref() {
        Some(uid) => app.store.selected_source(Some(uid)),
        None => app.config.search.default_source_type,
    });
    let max_sources = max_sources.unwrap_or(app.config.search.max_sources);

    let mut session = SearchSession::new(app.api.clone(), app.identity.clone(), app.config.poll_config());
    if let Some(uid) = thread_id.as_deref() {
        session.open(uid).await?;
        if session.is_polling() {
            println!("Thread {uid} is still answering a previous question; waiting for it first...");
            session.wait_for_completion().await;
        }
    }

    session.submit(query, source_type, Some(max_sources)).await?;

    let thread_uid = session
        .thread()
        .map(|t| t.thread_uid.clone())
        .context("session has no thread after submitting")?;
    app.store.set_active_thread(Some(&thread_uid))?;
    app.store.set_selected_source(source_type, Some(&thread_uid))?;
    info!(%thread_uid, route = session.route(), "Query submitted");

    if no_wait {
        println!("Submitted to thread {thread_uid}");
        return Ok(());
    }

    println!("Searching {source_type} for: {query}");
    let phase = session.wait_for_completion().await;
    print_session(&session);
    match phase {
        SessionPhase::PollingExhausted => {
            println!("The answer is not ready yet. Check again with: medsearch thread show {thread_uid}");
        }
        SessionPhase::Error(message) => bail!("search failed: {message}"),
        _ => {}
    }
    Ok(())
}

fn print_session(session: &SearchSession) {
    print!("{}", render::messages(&session.display_messages()));
    print!("{}", render::sources(&session.reconciliation()));
}

async fn thread(app: &mut App, action: ThreadAction) -> Result<()> {
    match action {
        ThreadAction::Show { thread_id } => {
            let mut session =
                SearchSession::new(app.api.clone(), app.identity.clone(), app.config.poll_config());
            session.open(&thread_id).await?;
            if session.is_polling() {
                println!("Waiting for the thread to finish...");
                session.wait_for_completion().await;
            }
            app.store.set_active_thread(Some(&thread_id))?;
            print_session(&session);
        }
        ThreadAction::List => {
            let user = require_user(app.identity.as_ref()).await?;
            let refs = app.api.list_threads(&user).await?;
            print!("{}", render::thread_refs(&refs));
        }
        ThreadAction::Rename { thread_id, name } => {
            let user = require_user(app.identity.as_ref()).await?;
            let source_type = app.store.selected_source(Some(&thread_id));
            app.api
                .update_thread_metadata(&user, &thread_id, &name, Some(source_type))
                .await?;
            println!("Renamed {thread_id} to \"{name}\"");
        }
        ThreadAction::Delete { thread_id } => {
            let user = require_user(app.identity.as_ref()).await?;
            app.api.delete_thread(&user, &thread_id).await?;
            app.store.forget_thread(&thread_id)?;
            println!("Deleted {thread_id}");
        }
    }
    Ok(())
}

async fn library_cmd(app: &mut App, action: LibraryAction) -> Result<()> {
    let api = app.api.as_ref();
    match action {
        LibraryAction::List { path } => {
            let path = path.map(|p| library::normalise_folder_path(&p));
            let sources = api.list_sources(path.as_deref()).await?;
            print!("{}", render::library(&sources));
        }
        LibraryAction::Search { query, path } => {
            let path = path.map(|p| library::normalise_folder_path(&p));
            let sources = api.list_sources(path.as_deref()).await?;
            let found = search_library(&sources, &query);
            info!(%query, matches = found.len(), total = sources.len(), "Library search");
            print!("{}", render::library(&found));
        }
        LibraryAction::AddFromThread { thread_id, pmid, path } => {
            let thread = api.fetch_thread(&thread_id).await?;
            let Some(source) = thread.sources.iter().find(|s| s.pmid == pmid) else {
                bail!("thread {thread_id} does not cite PMID {pmid}");
            };
            match library::save_to_library(api, source, &path).await? {
                SaveOutcome::Saved(saved) => {
                    println!("Saved as {}", saved.source_id.as_deref().unwrap_or("-"));
                }
                SaveOutcome::AlreadySaved(detail) => println!("Already in your library: {detail}"),
            }
        }
        LibraryAction::Move { source_id, new_path } => {
            let moved = api.move_source(&source_id, &new_path).await?;
            println!("Moved to {}", moved.path.as_deref().unwrap_or("/"));
        }
        LibraryAction::Delete { source_id } => {
            api.delete_source(&source_id).await?;
            if app.store.chat().current_source_id.as_deref() == Some(source_id.as_str()) {
                app.store.clear_chat()?;
            }
            println!("Deleted {source_id}");
        }
        LibraryAction::Upload { file, title, path } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("upload path has no file name")?
                .to_string();
            let title = title.unwrap_or_else(|| {
                file.file_stem().and_then(|s| s.to_str()).unwrap_or(&filename).to_string()
            });
            let body = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let stored = library::upload_pdf(api, &filename, body, &title, &path).await?;
            println!("Uploaded {} as {}", filename, stored.source_id.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}

async fn folder(app: &App, action: FolderAction) -> Result<()> {
    let api = app.api.as_ref();
    match action {
        FolderAction::List => print!("{}", render::folders(&api.list_folders().await?)),
        FolderAction::Create { path, name } => match library::create_folder(api, &path, name).await? {
            FolderOutcome::Created(folder) => println!("Created {}", folder.folder_path),
            FolderOutcome::AlreadyExists(detail) => {
                warn!(%path, "Folder already exists");
                println!("Folder already exists: {detail}");
            }
        },
        FolderAction::Delete { path } => {
            api.delete_folder(&library::normalise_folder_path(&path)).await?;
            println!("Deleted {path}");
        }
    }
    Ok(())
}

async fn chat(app: &mut App, source_id: &str, message: &str) -> Result<()> {
    let mut session =
        PaperChatSession::restore(app.api.clone(), app.api.clone(), app.store.chat().clone());
    session.open(source_id).await?;

    let result = session.send(message).await;
    app.store.set_chat(session.context().clone())?;

    match result? {
        Some(reply) => println!("{reply}"),
        None => print!("{}", render::chat_history(session.history())),
    }
    Ok(())
}

fn session(app: &mut App, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Show => {
            println!("{}", serde_json::to_string_pretty(app.store.state())?);
        }
        SessionAction::Reset => {
            app.store.reset()?;
            println!("Session state cleared ({})", app.store.path().display());
        }
    }
    Ok(())
}
