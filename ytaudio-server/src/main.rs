/* This file is part of the YT Audio project - https://github.com/mini-bomba/ytaudio
*
*  Copyright (C) 2025 mini_bomba
*  
*  This program is free software: you can redistribute it and/or modify
*  it under the terms of the GNU Affero General Public License as published by
*  the Free Software Foundation, either version 3 of the License, or
*  (at your option) any later version.
*
*  This program is distributed in the hope that it will be useful,
*  but WITHOUT ANY WARRANTY; without even the implied warranty of
*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
*  GNU Affero General Public License for more details.
*
*  You should have received a copy of the GNU Affero General Public License
*  along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
use std::{fs::{File, Permissions, set_permissions}, io::{Read, Write, self}, os::unix::prelude::PermissionsExt, sync::Arc, time::Duration};
use actix_files::Files;
use actix_web::{HttpServer, App, web, middleware::{Logger, NormalizePath}};
use anyhow::Context;
use env_logger::Env;
use log::{info, warn};
use ytaudio_jobs::StatusStore;

mod utils;
mod pages;
mod routes;
mod state;
use state::*;

const CONFIG_PATH: &str = "config.toml";

fn load_config() -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = match File::open(CONFIG_PATH) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents).with_context(|| format!("Failed to read {CONFIG_PATH}"))?;
            toml::from_str(&contents).with_context(|| format!("Failed to deserialize contents of {CONFIG_PATH}"))?
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let cfg = AppConfig::default();
            let serialized = toml::to_string(&cfg).context("Failed to serialize default AppConfig as TOML")?;
            let mut file = File::options().write(true).create_new(true).open(CONFIG_PATH).with_context(|| format!("Failed to create {CONFIG_PATH}"))?;
            write!(file, "{serialized}").with_context(|| format!("Failed to write serialized default AppConfig to {CONFIG_PATH}"))?;
            info!("Wrote the default configuration to {CONFIG_PATH}");
            cfg
        },
        Err(e) => {
            return Err(e).context(format!("Failed to open {CONFIG_PATH}"));
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let config = load_config()?;
    for dir in [&config.output_dir, &config.static_content_path] {
        tokio::fs::create_dir_all(dir).await.with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    match config.ytdlp.resolve() {
        Ok(path) => info!("Using yt-dlp at {}", path.display()),
        Err(e) => warn!("{e}, downloads will fail until it is installed"),
    }

    let store = Arc::new(config.status_store());
    StatusStore::spawn_sweeper(store.clone(), Duration::from_secs(config.jobs.sweep_interval_secs.max(1)));
    let queue = web::Data::new(config.start_job_queue(store.clone()));
    let resolver = web::Data::new(config.title_resolver());
    let store = web::Data::from(store);
    info!("Started {} download workers", config.jobs.workers);

    let config = web::Data::new(config);
    let mut server = {
        let config = config.clone();
        HttpServer::new(move || {
            App::new()
                .wrap(NormalizePath::trim())
                .wrap(Logger::default())
                .app_data(config.clone())
                .app_data(store.clone())
                .app_data(queue.clone())
                .app_data(resolver.clone())
                .configure(routes::configure)
                .service(Files::new("/static", config.static_content_path.as_path()))
        })
    };
    if let Some(workers) = config.http_workers {
        server = server.workers(workers);
    }
    if let Some((ref ip, port)) = config.listen.tcp {
        let ip_str = ip.as_str();
        server = server.bind((ip_str, port)).with_context(|| format!("Failed to bind to tcp port {ip_str}:{port}"))?;
        info!("Listening on {ip_str}:{port}");
    };
    if let Some(ref path) = config.listen.unix {
        let path_str = path.as_str();
        server = server.bind_uds(path_str).with_context(|| format!("Failed to bind to unix socket {path_str}"))?;
        if let Some(mode) = config.listen.unix_mode {
            let perms = Permissions::from_mode(mode);
            set_permissions(path_str, perms).with_context(|| format!("Failed to change mode of unix socket {path_str} to {mode}"))?;
        }
        info!("Listening on {path_str}");
    };
    server.run()
    .await
    .context("Error while running the server")
}

mod built_info {
    // Contents generated by buildscript, using built
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
