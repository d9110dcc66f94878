use masquerade::config::Config;
use masquerade::store::{Database, PoolStore};
use masquerade::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info, warn};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config = Config::from_env()?;
    info!(?config, "Configuration loaded");

    // Without a working database the bot still runs on the fallback pool
    let db = match &config.database_url {
        Some(url) => match Database::connect(url).await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(error = %e, "Database unavailable, using fallback nicknames");
                None
            }
        },
        None => {
            warn!("DATABASE_URL not set, using fallback nicknames");
            None
        }
    };

    let data = Data::new(PoolStore::new(db, config.fallback_nicknames.clone()));
    let framework_data = data.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx).await;
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx).await;
                })
            },
            on_error: |error| Box::pin(commands::on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console(format!(
                    "Registering {} commands for {BOT_NAME}",
                    framework.options().commands.len()
                ));
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(framework_data)
            })
        })
        .build();

    // Member events are needed to see nicknames of members joining voice
    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .event_handler(handlers::Handler::new(data))
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(err) = client.start().await {
        error!(error = %err, "Client stopped with an error");
        return Err(err.into());
    }

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
