use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use netease_api::auth::Session;
use netease_api::download::{
    DEFAULT_TEMPLATE, DownloadManager, DownloadResult, DownloadTask, ExistingFiles, NameTemplate,
    sanitize_filename,
};
use netease_api::types::{SearchType, Track};
use netease_api::{Area, NeteaseClient, NeteaseError, QualityLevel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ncm",
    version,
    about = "Netease Cloud Music CLI: search, inspect and download music"
)]
struct Cli {
    /// Cookie: a `MUSIC_U` value or a full cookie string
    #[arg(short, long, global = true, env = "NCM_COOKIE", hide_env_values = true)]
    cookie: Option<String>,
    /// File containing the cookie
    #[arg(short = 'f', long, global = true, env = "NCM_COOKIE_FILE", value_name = "PATH")]
    cookie_file: Option<PathBuf>,
    /// More logging (-v debug, -vv trace); `RUST_LOG` is used otherwise
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save a login cookie (`MUSIC_U`) after verifying it
    Login {
        /// `MUSIC_U` value or full cookie string
        #[arg(required_unless_present = "check")]
        cookie_value: Option<String>,
        /// Check current login status
        #[arg(long)]
        check: bool,
    },
    /// Clear saved session
    Logout,
    /// Search for tracks, albums, artists, or playlists
    Search {
        /// Search keyword
        keyword: String,
        /// Search type
        #[arg(short = 't', long, default_value = "track")]
        r#type: SearchKind,
        /// Max results per page
        #[arg(short, long, default_value = "20")]
        limit: u64,
        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: u64,
    },
    /// Show track details
    Info {
        /// Track IDs
        #[arg(required = true)]
        track_ids: Vec<u64>,
    },
    /// Get track lyrics
    Lyric {
        /// Track ID
        track_id: u64,
        /// Include translated lyrics
        #[arg(short, long)]
        translated: bool,
        /// Include romanized lyrics
        #[arg(short, long)]
        romanized: bool,
        /// Save lyrics to a file
        #[arg(short, long, value_name = "PATH")]
        save: Option<PathBuf>,
    },
    /// Download tracks
    Download {
        /// Track IDs
        #[arg(required = true)]
        track_ids: Vec<u64>,
        #[command(flatten)]
        opts: DownloadOpts,
    },
    /// Show a playlist, optionally downloading all of it
    Playlist {
        /// Playlist ID
        playlist_id: u64,
        /// Download every track into a sub-directory named after the playlist
        #[arg(short, long)]
        download: bool,
        #[command(flatten)]
        opts: DownloadOpts,
    },
    /// Show an album, optionally downloading all of it
    Album {
        /// Album ID
        album_id: u64,
        /// Download every track into a sub-directory named after the album
        #[arg(short, long)]
        download: bool,
        #[command(flatten)]
        opts: DownloadOpts,
    },
    /// Show current user info
    Me,
    /// Daily recommended songs (requires login)
    Recommend,
    /// Newly released songs
    New {
        /// Region filter
        #[arg(short, long, default_value = "all")]
        area: AreaArg,
        /// Max results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Args)]
struct DownloadOpts {
    /// Highest acceptable quality; lower levels are tried in order
    #[arg(short, long, default_value = "exhigh")]
    quality: QualityArg,
    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = "downloads")]
    output: PathBuf,
    /// File name template: {title} {artist} {album} {id} {quality}
    #[arg(short = 'F', long, default_value = DEFAULT_TEMPLATE)]
    format: String,
    /// Concurrent downloads
    #[arg(short, long, default_value = "4")]
    jobs: usize,
    /// Save lyrics next to each track
    #[arg(long)]
    lyrics: bool,
    /// What to do with files already downloaded by an earlier run
    #[arg(long, value_name = "MODE", default_value = "skip")]
    existing: ExistingArg,
}

#[derive(Clone, ValueEnum)]
enum SearchKind {
    Track,
    Album,
    Artist,
    Playlist,
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    Standard,
    Higher,
    Exhigh,
    Lossless,
    Hires,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExistingArg {
    /// Keep the file, do not download again
    Skip,
    /// Download again and replace it
    Overwrite,
    /// Download again and keep both copies
    Rename,
}

#[derive(Clone, Copy, ValueEnum)]
enum AreaArg {
    All,
    Chinese,
    Western,
    Japanese,
    Korean,
}

impl From<SearchKind> for SearchType {
    fn from(k: SearchKind) -> Self {
        match k {
            SearchKind::Track => Self::Track,
            SearchKind::Album => Self::Album,
            SearchKind::Artist => Self::Artist,
            SearchKind::Playlist => Self::Playlist,
        }
    }
}

impl From<QualityArg> for QualityLevel {
    fn from(q: QualityArg) -> Self {
        match q {
            QualityArg::Standard => Self::Standard,
            QualityArg::Higher => Self::Higher,
            QualityArg::Exhigh => Self::Exhigh,
            QualityArg::Lossless => Self::Lossless,
            QualityArg::Hires => Self::Hires,
        }
    }
}

impl From<ExistingArg> for ExistingFiles {
    fn from(e: ExistingArg) -> Self {
        match e {
            ExistingArg::Skip => Self::Skip,
            ExistingArg::Overwrite => Self::Overwrite,
            ExistingArg::Rename => Self::Rename,
        }
    }
}

impl From<AreaArg> for Area {
    fn from(a: AreaArg) -> Self {
        match a {
            AreaArg::All => Self::All,
            AreaArg::Chinese => Self::Chinese,
            AreaArg::Western => Self::Western,
            AreaArg::Japanese => Self::Japanese,
            AreaArg::Korean => Self::Korean,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let session = resolve_session(cli.cookie.as_deref(), cli.cookie_file.as_deref())?;
    let client = NeteaseClient::with_session(session)?;
    run(client, cli.command).await
}

async fn run(client: NeteaseClient, command: Command) -> Result<()> {
    match command {
        Command::Login {
            cookie_value,
            check,
        } => cmd_login(cookie_value, check).await,
        Command::Logout => cmd_logout(),
        Command::Search {
            keyword,
            r#type,
            limit,
            page,
        } => cmd_search(&client, &keyword, r#type, limit, page).await,
        Command::Info { track_ids } => cmd_info(&client, &track_ids).await,
        Command::Lyric {
            track_id,
            translated,
            romanized,
            save,
        } => cmd_lyric(&client, track_id, translated, romanized, save.as_deref()).await,
        Command::Download { track_ids, opts } => {
            download_batch(Arc::new(client), track_ids, &opts, None).await
        }
        Command::Playlist {
            playlist_id,
            download,
            opts,
        } => cmd_playlist(client, playlist_id, download, &opts).await,
        Command::Album {
            album_id,
            download,
            opts,
        } => cmd_album(client, album_id, download, &opts).await,
        Command::Me => cmd_me(&client).await,
        Command::Recommend => {
            let tracks = client
                .recommend_songs()
                .await
                .context("failed to fetch recommendations")?;
            print_tracks(&tracks);
            Ok(())
        }
        Command::New { area, limit } => {
            let mut tracks = client.new_songs(area.into()).await?;
            tracks.truncate(limit);
            print_tracks(&tracks);
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("netease_api=debug,ncm=debug,info"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// `--cookie` wins over `--cookie-file`, which wins over the saved session.
fn resolve_session(cookie: Option<&str>, cookie_file: Option<&Path>) -> Result<Session> {
    if let Some(cookie) = cookie {
        return Ok(Session::from_cookie_input(cookie));
    }
    if let Some(path) = cookie_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cookie file {}", path.display()))?;
        return Ok(Session::from_cookie_input(&text));
    }
    Ok(Session::load()?)
}

// ── login / logout ──

async fn cmd_login(cookie_value: Option<String>, check: bool) -> Result<()> {
    if check {
        let session = Session::load()?;
        if session.is_logged_in() {
            let client = NeteaseClient::with_session(session)?;
            match client.user_info().await {
                Ok(profile) => println!("Logged in as: {} (id={})", profile.nickname, profile.id),
                Err(e) => println!("Session exists but validation failed: {e}"),
            }
        } else {
            println!("Not logged in.");
        }
        return Ok(());
    }

    let input = cookie_value.context("cookie value required")?;
    let session = Session::from_cookie_input(&input);
    if !session.is_logged_in() {
        bail!("no MUSIC_U value found in the given cookie");
    }
    let client = NeteaseClient::with_session(session.clone())?;
    let profile = client
        .user_info()
        .await
        .context("cookie rejected by the server")?;
    session.save()?;
    println!("Session saved. Welcome, {}!", profile.nickname);
    Ok(())
}

fn cmd_logout() -> Result<()> {
    if Session::clear()? {
        println!("Session cleared.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

// ── search / info / lyric ──

async fn cmd_search(
    client: &NeteaseClient,
    keyword: &str,
    kind: SearchKind,
    limit: u64,
    page: u64,
) -> Result<()> {
    let offset = page.saturating_sub(1) * limit;
    let result = client.search(keyword, kind.into(), limit, offset).await?;

    println!("Total: {}\n", result.total);

    if let Some(tracks) = &result.tracks {
        print_tracks(tracks);
    }
    if let Some(albums) = &result.albums {
        for a in albums {
            println!("  [{}] {}", a.id, a.name);
        }
    }
    if let Some(artists) = &result.artists {
        for a in artists {
            println!("  [{}] {}", a.id, a.name);
        }
    }
    if let Some(playlists) = &result.playlists {
        for p in playlists {
            println!("  [{}] {} ({} tracks)", p.id, p.name, p.track_count);
        }
    }
    Ok(())
}

async fn cmd_info(client: &NeteaseClient, track_ids: &[u64]) -> Result<()> {
    let tracks = client.track_details(track_ids).await?;
    if tracks.is_empty() {
        bail!("no tracks found");
    }
    for (i, t) in tracks.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("Track:    {} (id={})", t.name, t.id);
        println!("Artists:  {}", t.artist_names());
        println!("Album:    {} (id={})", t.album.name, t.album.id);
        println!("Duration: {}", t.duration_display());
    }
    Ok(())
}

async fn cmd_lyric(
    client: &NeteaseClient,
    track_id: u64,
    translated: bool,
    romanized: bool,
    save: Option<&Path>,
) -> Result<()> {
    let lyric = client.track_lyric(track_id).await?;
    let Some(lrc) = lyric.lrc else {
        println!("No lyrics available.");
        return Ok(());
    };

    let mut text = lrc;
    if translated {
        if let Some(t) = &lyric.tlyric {
            text.push_str("\n\n");
            text.push_str(t);
        }
    }
    if romanized {
        if let Some(r) = &lyric.romalrc {
            text.push_str("\n\n");
            text.push_str(r);
        }
    }
    println!("{text}");

    if let Some(path) = save {
        std::fs::write(path, &text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("\nLyrics saved to: {}", path.display());
    }
    Ok(())
}

// ── playlist / album ──

async fn cmd_playlist(
    client: NeteaseClient,
    playlist_id: u64,
    download: bool,
    opts: &DownloadOpts,
) -> Result<()> {
    let p = client.playlist_detail(playlist_id).await?;
    println!("Playlist: {} (id={})", p.name, p.id);
    println!("Tracks:   {}", p.track_count);
    if let Some(desc) = &p.description {
        println!("Desc:     {desc}");
    }
    if let Some(creator) = &p.creator {
        println!("Creator:  {} (id={})", creator.name, creator.id);
    }

    if download {
        let ids = p.all_track_ids();
        let subdir = sanitize_filename(&p.name);
        return download_batch(Arc::new(client), ids, opts, Some(&subdir)).await;
    }

    let tracks = client.playlist_tracks(&p).await?;
    println!();
    print_tracks(&tracks);
    Ok(())
}

async fn cmd_album(
    client: NeteaseClient,
    album_id: u64,
    download: bool,
    opts: &DownloadOpts,
) -> Result<()> {
    let (album, tracks) = client.album(album_id).await?;
    println!("Album:  {} (id={})", album.name, album.id);
    println!("Tracks: {}", tracks.len());

    if download {
        let ids = tracks.iter().map(|t| t.id).collect();
        let subdir = sanitize_filename(&album.name);
        return download_batch(Arc::new(client), ids, opts, Some(&subdir)).await;
    }

    println!();
    print_tracks(&tracks);
    Ok(())
}

// ── me ──

async fn cmd_me(client: &NeteaseClient) -> Result<()> {
    let profile = client.user_info().await?;
    println!("User:   {} (id={})", profile.nickname, profile.id);
    println!("VIP:    {}", profile.vip_label());
    if let Some(url) = &profile.avatar_url {
        println!("Avatar: {url}");
    }
    Ok(())
}

// ── download ──

async fn download_batch(
    client: Arc<NeteaseClient>,
    track_ids: Vec<u64>,
    opts: &DownloadOpts,
    subdir: Option<&str>,
) -> Result<()> {
    if track_ids.is_empty() {
        println!("Nothing to download.");
        return Ok(());
    }
    let template = NameTemplate::parse(&opts.format).context("invalid --format")?;
    let directory = match subdir {
        Some(sub) => opts.output.join(sub),
        None => opts.output.clone(),
    };
    let quality = QualityLevel::from(opts.quality);
    let tasks: Vec<DownloadTask> = track_ids
        .iter()
        .map(|&id| DownloadTask::new(id, quality, &directory).with_template(template.clone()))
        .collect();

    let bar = ProgressBar::new(tasks.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );
    let reporter = bar.clone();
    let manager = DownloadManager::builder(client)
        .lyrics(opts.lyrics)
        .existing(opts.existing.into())
        .on_complete(move |result| report(&reporter, result))
        .build();

    let token = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(token.clone()));
    let results = manager
        .download_all_with_cancel(tasks, opts.jobs, &token)
        .await;
    watcher.abort();
    bar.finish_and_clear();

    let failed = results.iter().filter(|r| !r.is_success()).count();
    println!(
        "{} downloaded, {failed} failed ({})",
        results.len() - failed,
        directory.display()
    );
    if token.is_cancelled() {
        bail!("cancelled");
    }
    if failed > 0 {
        bail!("{failed} of {} downloads failed", results.len());
    }
    Ok(())
}

fn report(bar: &ProgressBar, result: &DownloadResult) {
    bar.inc(1);
    match &result.outcome {
        Ok(done) => {
            bar.set_message(done.track.name.clone());
            bar.println(format!(
                "  {} {} [{}] {}",
                if done.skipped { "skip" } else { "ok  " },
                done.track.id,
                done.achieved_quality,
                done.final_path.display()
            ));
        }
        Err(failure) if matches!(failure.error, NeteaseError::Cancelled) => {
            debug!(track_id = result.track_id, "skipped after cancellation");
        }
        Err(failure) => bar.println(format!("  FAIL {} {failure}", result.track_id)),
    }
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            eprintln!("Interrupted, cancelling downloads...");
            token.cancel();
        }
        Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
    }
}

fn print_tracks(tracks: &[Track]) {
    if tracks.is_empty() {
        println!("  (no tracks)");
        return;
    }
    for (i, t) in tracks.iter().enumerate() {
        println!(
            "  {:>3}. [{}] {} - {} ({}) {}",
            i + 1,
            t.id,
            t.artist_names(),
            t.name,
            t.album.name,
            t.duration_display(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn download_defaults() {
        let cli = Cli::try_parse_from(["ncm", "download", "1", "2", "-q", "hires"]).unwrap();
        let Command::Download { track_ids, opts } = cli.command else {
            panic!("expected download command");
        };
        assert_eq!(track_ids, [1, 2]);
        assert_eq!(QualityLevel::from(opts.quality), QualityLevel::Hires);
        assert_eq!(opts.format, DEFAULT_TEMPLATE);
        assert_eq!(opts.jobs, 4);
        assert!(!opts.lyrics);
        assert_eq!(ExistingFiles::from(opts.existing), ExistingFiles::Skip);

        let cli = Cli::try_parse_from(["ncm", "album", "9", "-d", "--existing", "overwrite"]).unwrap();
        let Command::Album { opts, .. } = cli.command else {
            panic!("expected album command");
        };
        assert_eq!(ExistingFiles::from(opts.existing), ExistingFiles::Overwrite);
    }

    #[test]
    fn cookie_flag_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cookie.txt");
        std::fs::write(&file, "MUSIC_U=from-file; os=pc\n").unwrap();

        let session = resolve_session(Some("from-flag"), Some(&file)).unwrap();
        assert_eq!(session.music_u.as_deref(), Some("from-flag"));
        let session = resolve_session(None, Some(&file)).unwrap();
        assert_eq!(session.music_u.as_deref(), Some("from-file"));
    }
}
