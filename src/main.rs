#[macro_use]
extern crate rocket;

mod api;
mod checkin;
mod config;
mod db;
mod diff;
mod env;
mod error;
mod export;
mod feed;
mod models;
mod playground;
mod roster;
mod routes;
mod sandbox;
mod session_code;
mod sessions;
mod store;
mod telemetry;
mod validation;
mod versions;
#[cfg(test)]
mod test;

use std::sync::Arc;
use std::time::Duration;

use api::{
    api_active_session, api_artifact_versions, api_attendance_stream, api_compare_versions,
    api_correct_points, api_create_artifact, api_create_playground, api_default_catcher,
    api_delete_session, api_end_session, api_export_all, api_export_session, api_get_artifact,
    api_get_playground, api_get_session, api_list_artifacts, api_list_sessions, api_playground_preview,
    api_pop_in, api_pop_out, api_read_console, api_relay_console, api_render, api_run_playground,
    api_save_artifact, api_session_attendance, api_session_qr, api_set_auto_run, api_start_session,
    api_student_attendance, api_teardown_playground, api_update_sources, api_window_closed, health,
};
use config::ClassroomConfig;
use error::AppError;
use feed::ChangeFeed;
use playground::PlaygroundHub;
use rocket::fairing::AdHoc;
use rocket::http::uri::Origin;
use rocket::{Build, Rocket};
use routes::{check_in_catcher, check_in_page, submit_check_in};
use store::{SharedStore, SqliteStore};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;
use thiserror::Error;

use sqlx::SqlitePool;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("Rocket error: {0}")]
    Rocket(#[from] rocket::Error),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    env::load_environment()?;
    let _otel = init_tracing();

    let config = ClassroomConfig::from_figment(&rocket::Config::figment())?;
    let database_url = env::database_url();

    let pool = SqlitePool::connect(&database_url).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;
    info!("Migrations completed successfully");

    let store: SharedStore = Arc::new(SqliteStore::new(pool, ChangeFeed::new(config.feed_capacity)));

    let _rocket = init_rocket(store, config).launch().await?;
    Ok(())
}

pub fn init_rocket(store: SharedStore, config: ClassroomConfig) -> Rocket<Build> {
    info!("Starting classroom live");

    let sign_in_base = match Origin::parse_owned(config.sign_in_base()) {
        Ok(origin) => origin.path().to_string(),
        Err(err) => {
            warn!("Invalid sign-in path {:?} ({}), using /signin", config.sign_in_path, err);
            "/signin".to_string()
        }
    };

    rocket::build()
        .manage(store)
        .manage(config)
        .manage(PlaygroundHub::new())
        .attach(AdHoc::on_liftoff("Playground sweeper", |rocket| {
            Box::pin(async move {
                let (Some(hub), Some(config)) = (
                    rocket.state::<PlaygroundHub>(),
                    rocket.state::<ClassroomConfig>(),
                ) else {
                    return;
                };
                spawn_playground_sweeper(hub.clone(), config.playground_idle());
            })
        }))
        .mount(
            "/api",
            routes![
                api_list_sessions,
                api_active_session,
                api_start_session,
                api_get_session,
                api_end_session,
                api_delete_session,
                api_session_qr,
                api_session_attendance,
                api_attendance_stream,
                api_export_session,
                api_export_all,
                api_student_attendance,
                api_correct_points,
                api_create_artifact,
                api_list_artifacts,
                api_get_artifact,
                api_save_artifact,
                api_artifact_versions,
                api_compare_versions,
                api_create_playground,
                api_get_playground,
                api_update_sources,
                api_run_playground,
                api_set_auto_run,
                api_pop_out,
                api_pop_in,
                api_window_closed,
                api_relay_console,
                api_read_console,
                api_playground_preview,
                api_teardown_playground,
                api_render,
            ],
        )
        .register("/api", catchers![api_default_catcher])
        .mount("/api", routes![health])
        .mount(sign_in_base.clone(), routes![check_in_page, submit_check_in])
        .register(sign_in_base, catchers![check_in_catcher])
        .attach(TelemetryFairing)
}

fn spawn_playground_sweeper(hub: PlaygroundHub, max_idle: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;

        loop {
            match hub.sweep_idle(max_idle) {
                Ok(count) => {
                    if count > 0 {
                        info!("Swept {} idle playgrounds", count);
                    }
                }
                Err(e) => {
                    error!("Failed to sweep idle playgrounds: {}", e);
                }
            }

            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    });
}
