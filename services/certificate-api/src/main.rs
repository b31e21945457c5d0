use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use shared::config::Settings;
use shared::db::PgCertificateStore;
use shared::embedding;
use shared::evidence::LocalEvidenceStore;
use shared::extraction::FieldExtractor;
use shared::service::CertificateService;
use text_extraction::TesseractReader;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod routes;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::new().context("loading settings")?;

    let store = PgCertificateStore::connect(&settings)?;
    store.ensure_schema().await.context("preparing schema")?;

    let service = CertificateService::new(
        Arc::new(store),
        Arc::new(TesseractReader::from_settings(&settings)),
        FieldExtractor::from_settings(&settings),
        embedding::from_settings(&settings),
        Arc::new(LocalEvidenceStore::new(
            &settings.evidence_dir,
            &settings.evidence_public_url,
        )),
    );
    let service = web::Data::new(service);

    info!(port = settings.http_port, "certificate-api listening");
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(service.clone())
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", settings.http_port))?
    .run()
    .await?;
    Ok(())
}
