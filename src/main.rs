/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use dotenv::dotenv;
use forumtree::{db, settings::Settings};
use log::info;

#[async_std::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let settings = Settings::new()?;
    info!("Preparing forum database {}", settings.database);

    let pool = db::install(&settings).await?;
    let status = db::with_deadline(settings.operation_timeout(), db::status(&pool)).await?;
    info!("{} users, {} forums, {} threads, {} posts",
        status.user, status.forum, status.thread, status.post);
    pool.close().await;
    Ok(())
}
