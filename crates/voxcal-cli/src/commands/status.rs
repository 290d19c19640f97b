//! Connection status and disconnect commands.

use chrono::Local;
use voxcal_providers::ConnectionStatus;

use super::Context;
use crate::error::ClientResult;

pub async fn status(ctx: &Context, json: bool) -> ClientResult<()> {
    let status = ctx.credentials.connection_status(&ctx.user_id).await?;
    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| crate::error::ClientError::config(e.to_string()))?;
        println!("{rendered}");
    } else {
        println!("{}", describe(&ctx.user_id, &status));
    }
    Ok(())
}

pub async fn disconnect(ctx: &Context) -> ClientResult<()> {
    ctx.credentials.delete_credential(&ctx.user_id).await?;
    println!("Disconnected Google Calendar for {}.", ctx.user_id);
    Ok(())
}

fn describe(user_id: &str, status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::NotConnected => {
            format!("{user_id}: not connected (run `voxcal connect`)")
        }
        ConnectionStatus::Connected { expires_at, stale } => {
            let local = expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
            if *stale {
                format!("{user_id}: connected, access token refreshes on next use (expires {local})")
            } else {
                format!("{user_id}: connected, access token valid until {local}")
            }
        }
    }
}
