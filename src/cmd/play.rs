use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use vodplay::{
    Catalog, ExternalPlayerSurface, HeadlessSurface, HlsEngineFactory, Phase, PlaybackSurface,
    PlayerConfig, PlayerEvent, StreamDescriptor, StreamSession,
};

use super::catalog_client;

pub struct PlayOptions {
    pub output: Option<String>,
    pub player: Option<String>,
    pub native: bool,
    pub duration: Option<u64>,
}

async fn resolve(config: &PlayerConfig, target: &str) -> Result<StreamDescriptor> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(StreamDescriptor::new(target, None)?);
    }
    let catalog = catalog_client(config)?;
    let item = catalog
        .get(target)
        .await
        .with_context(|| format!("looking up video {target}"))?;
    eprintln!("🎬 {}", item.entry.title);
    Ok(catalog.descriptor(&item)?)
}

fn open_output(output: Option<&str>) -> Result<Box<dyn Write + Send>> {
    match output {
        None | Some("-") => Ok(Box::new(std::io::stdout())),
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {path}"))?;
            eprintln!("💾 Writing to {path}");
            Ok(Box::new(BufWriter::new(file)))
        }
    }
}

pub async fn cmd_play(config: &PlayerConfig, target: &str, options: &PlayOptions) -> Result<()> {
    let descriptor = resolve(config, target).await?;
    let factory = Arc::new(HlsEngineFactory::new(config.engine.request_timeout())?);
    let mut session = StreamSession::new(factory, config);
    let limit = options.duration.map(Duration::from_secs);

    if options.native || options.player.is_some() {
        let surface = match &options.player {
            Some(player) => ExternalPlayerSurface::new(player.as_str()),
            None => ExternalPlayerSurface::detect().ok_or_else(|| {
                anyhow!("no external player found (tried mpv, vlc, ffplay, iina)")
            })?,
        };
        eprintln!("🎬 Playing with {}", surface.player());
        let surface = Arc::new(surface);
        let ended = ExternalPlayerSurface::is_ended;
        drive(&mut session, descriptor, &surface, ended, limit).await
    } else {
        let surface = Arc::new(HeadlessSurface::new(open_output(options.output.as_deref())?));
        let ended = HeadlessSurface::is_ended;
        let result = drive(&mut session, descriptor, &surface, ended, limit).await;
        eprintln!("✅ {} bytes written", surface.bytes_written());
        result
    }
}

/// Pump the session until the surface ends, the limit is hit, the user
/// interrupts or playback fails.
async fn drive<S>(
    session: &mut StreamSession,
    descriptor: StreamDescriptor,
    surface: &Arc<S>,
    is_ended: fn(&S) -> bool,
    limit: Option<Duration>,
) -> Result<()>
where
    S: PlaybackSurface + 'static,
{
    let mut events = session.subscribe();
    session.attach(descriptor, surface);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    let outcome = loop {
        tokio::select! {
            _ = session.process_next() => {}
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break Ok(());
            }
        }

        let mut failure = None;
        while let Ok(event) = events.try_recv() {
            match event {
                PlayerEvent::Loaded { url } => info!(%url, "Stream loaded"),
                PlayerEvent::Playing => info!("Playing"),
                PlayerEvent::Fault(fault) => failure = Some(fault),
            }
        }
        if let Some(fault) = failure {
            break Err(anyhow!("playback failed: {fault}"));
        }
        if session.phase() == Phase::Failed {
            break Err(anyhow!("playback failed"));
        }
        if is_ended(surface) {
            info!("End of stream");
            break Ok(());
        }
        if limit.is_some_and(|limit| surface.current_time() >= limit) {
            info!("Duration limit reached");
            break Ok(());
        }
    };

    session.detach();
    outcome
}

