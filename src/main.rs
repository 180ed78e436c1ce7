use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use meow::{
    application::{Application, initialize_logger},
    cli::Cli,
    config::Settings,
    utils::start_config_watcher,
};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = Settings::new(&args.config).with_context(|| "init config failed")?;
    if args.check {
        println!("{}: config ok", args.config);
        return Ok(());
    }

    let _guard = initialize_logger(&settings)?;

    let app = Arc::new(Application::new(&settings)?);
    app.start(&settings).await?;

    // 启动配置文件监听，回调在监听线程中执行，交回 tokio 运行时处理
    let runtime = tokio::runtime::Handle::current();
    let app_clone = app.clone();
    let stop_tx = start_config_watcher(&args.config, move |result| {
        let app = app_clone.clone();
        runtime.spawn(async move {
            app.handle_config_change(result).await;
        });
    })?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    app.shutdown(Some(stop_tx)).await;
    Ok(())
}
