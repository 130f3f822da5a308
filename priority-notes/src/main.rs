use std::net::SocketAddr;

use priority_notes::{
    app::{self, AppParams},
    config, init_db,
    shared::tracing::{add_tracing_layer, setup_tracing},
    Error, Result,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config();

    setup_tracing(config.log_json);

    let conn = init_db().await?;

    let (app, _) = app::create(AppParams {
        db: conn,
        router: app::api_router,
    })
    .await?;

    let app = add_tracing_layer(app);

    let port = config.port;
    let listener = TcpListener::bind(format!("127.0.0.1:{port}"))
        .await
        .map_err(|e| Error::App(e.into()))?;

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("listening on http://{addr}");
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| Error::App(e.into()))?;

    Ok(())
}
