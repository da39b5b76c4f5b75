//! # speedwatch
//!
//! A utility application to run scheduled speedtests, persist the results and
//! serve them over HTTP.
//!
//! ## Disclaimer
//! This project is not affiliated with, endorsed by, or sponsored by Ookla. (Ookla®).
//! All trademarks and copyrights belong to their respective owners.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use actix_web::{App, HttpServer, web};
use speedwatch::{AppContext, Config, api, init_tracing};
use tracing::{error, info};

/// Main entrypoint builds the application context, resumes the configured
/// schedule and starts the Actix-web server.
///
/// Binds to `BIND_ADDRESS` and `BIND_PORT` environment variables or defaults.
#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let ctx = AppContext::from_config(&config).await.map_err(|e| {
        error!(error = %e, "failed to initialize");
        io::Error::other(e)
    })?;
    let ctx = web::Data::new(ctx);
    ctx.resume(&config);

    info!(
        "starting server at http://{}:{}/speed",
        config.bind_address, config.bind_port
    );

    let app_ctx = ctx.clone();
    let served = HttpServer::new(move || {
        App::new()
            .app_data(app_ctx.clone())
            .configure(api::configure)
    })
    .bind((config.bind_address.as_str(), config.bind_port))?
    .run()
    .await;

    ctx.shutdown();
    served
}
