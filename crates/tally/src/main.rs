use std::sync::Arc;

use tracing::info;

use tally_core::{
    config::Config,
    game::CountingGame,
    highscore::{HighscoreSweeper, HighscoreTracker, SweepClock},
    leaderboard::Leaderboard,
    store::CountingStore,
};
use tally_sqlite::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), tally_core::Error> {
    tally_core::logging::init("tally")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn CountingStore> = Arc::new(SqliteStore::open(&cfg.database_path).await?);
    let tracker = HighscoreTracker::new(store.clone(), Arc::new(SweepClock::new()));

    let sweeper = HighscoreSweeper::new(tracker.clone(), cfg.sweep_interval);
    sweeper.start().await;

    let game = Arc::new(CountingGame::new(store.clone(), tracker));
    let leaderboard = Leaderboard::new(store);

    let result = tally_telegram::router::run_polling(cfg, game, leaderboard)
        .await
        .map_err(|e| tally_core::Error::External(format!("telegram bot failed: {e}")));

    sweeper.stop().await;
    info!("Shut down");
    result
}
