use crate::{
    annotate::Annotator,
    annotation_service::AnnotationService,
    config::Config,
    labels::ClassLabels,
    ort_service::OrtModelService,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let labels = match ClassLabels::from_config(&config.labels) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("Failed to load class labels: {:?}", e);
            return Err(Box::new(e));
        }
    };

    // Loaded once; every request shares these sessions.
    let model_service = match OrtModelService::new(&config.model, labels) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("Failed to initialize model service: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let annotator = match Annotator::from_config(&config.annotation) {
        Ok(annotator) => annotator,
        Err(e) => {
            tracing::error!("Failed to load label font: {:?}", e);
            return Err(Box::new(e));
        }
    };
    let annotation_service = Arc::new(AnnotationService::new(model_service, annotator));
    let metrics = Arc::new(Metrics::new()?);

    let state = SharedState::new(
        annotation_service,
        metrics,
        config.server.index_file.clone(),
    );
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
