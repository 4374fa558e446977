mod classifier;
mod handlers;
mod models;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use classifier::Classifier;

const MODEL_PATH: &str = "model.onnx";
const BIND_ADDR: &str = "127.0.0.1:8000";

/// Browser access is limited to the two pinned origins, which may send
/// credentialed requests; methods and headers are unrestricted for them.
fn cors() -> Cors {
    Cors::default()
        .allowed_origin("http://localhost")
        .allowed_origin("http://localhost:3000")
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // The model must be loadable before the server accepts traffic.
    let classifier = Classifier::load(MODEL_PATH).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("failed to load model from {}: {}", MODEL_PATH, e),
        )
    })?;
    let classifier = web::Data::new(classifier);

    log::info!("Model loaded from {}", MODEL_PATH);
    log::info!("Server running at http://{}", BIND_ADDR);

    HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .app_data(classifier.clone())
            .service(web::resource("/ping").route(web::get().to(handlers::ping)))
            .service(web::resource("/predict").route(web::post().to(handlers::predict)))
    })
    .bind(BIND_ADDR)?
    .run()
    .await
}
