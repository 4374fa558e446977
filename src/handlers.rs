use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use log::{error, info};

use crate::classifier::{Classifier, ClassifyError};
use crate::models::{PingResponse, Prediction};

const PAGE_TEMPLATE: &str = include_str!("../templates/index.html");
const ERROR_LABEL: &str = "Error";
const UPLOAD_FIELD: &str = "file";

pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(PingResponse {
        message: "Hello, I am alive",
    })
}

pub async fn predict(classifier: web::Data<Classifier>, mut payload: Multipart) -> HttpResponse {
    let data = match read_upload(&mut payload).await {
        Ok(data) => data,
        Err(e) => {
            error!("Error reading upload: {}", e);
            return error_page();
        }
    };
    info!("Received upload: {} bytes", data.len());

    respond(classifier.classify(&data))
}

/// Collect the bytes of the `file` field, draining any other fields the
/// client may have sent.
async fn read_upload(payload: &mut Multipart) -> Result<Vec<u8>, actix_web::Error> {
    let mut data = Vec::new();
    while let Some(item) = payload.next().await {
        let mut field = item?;
        // A part without a name parameter is not the upload, just drain it.
        let wanted = field.content_disposition().get_name() == Some(UPLOAD_FIELD);
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if wanted {
                data.extend_from_slice(&chunk);
            }
        }
    }
    Ok(data)
}

/// Every failure kind collapses into the same "Error" page, still HTTP 200;
/// the kind is only visible in the log line.
fn respond(outcome: Result<Prediction, ClassifyError>) -> HttpResponse {
    match outcome {
        Ok(prediction) => {
            info!(
                "Prediction: {}, Confidence: {:.2}%",
                prediction.label, prediction.confidence
            );
            render_page(prediction.label, prediction.confidence)
        }
        Err(e) => {
            error!("Error during prediction: {}", e);
            error_page()
        }
    }
}

fn render_page(label: &str, confidence: f32) -> HttpResponse {
    let body = PAGE_TEMPLATE
        .replace("{{ predicted_class }}", label)
        .replace("{{ confidence }}", &format!("{:.2}", confidence));
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn error_page() -> HttpResponse {
    render_page(ERROR_LABEL, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::error::PayloadError;
    use actix_web::http::{header, StatusCode};
    use actix_web::web::Bytes;
    use actix_web::{test, App};
    use futures_util::stream;

    async fn body_text(resp: HttpResponse) -> String {
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const BOUNDARY: &str = "7a8b2c9d0e1f";

    fn single_part_body(disposition: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: {d}\r\n\r\nleafy bytes\r\n--{b}--\r\n",
            b = BOUNDARY,
            d = disposition
        )
    }

    async fn collect_upload(body: String) -> Result<Vec<u8>, actix_web::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_str(&format!("multipart/form-data; boundary={}", BOUNDARY))
                .unwrap(),
        );
        let payload = stream::once(async move { Ok::<_, PayloadError>(Bytes::from(body)) });
        let mut multipart = Multipart::new(&headers, payload);
        read_upload(&mut multipart).await
    }

    #[actix_web::test]
    async fn ping_returns_fixed_liveness_payload() {
        let app = test::init_service(
            App::new().service(web::resource("/ping").route(web::get().to(ping))),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({ "message": "Hello, I am alive" }));
    }

    #[actix_web::test]
    async fn collects_bytes_of_the_file_field() {
        let body = single_part_body("form-data; name=\"file\"; filename=\"leaf.png\"");
        let data = collect_upload(body).await.unwrap();
        assert_eq!(data, b"leafy bytes");
    }

    #[actix_web::test]
    async fn part_without_a_field_name_is_ignored() {
        let body = single_part_body("form-data");
        let data = collect_upload(body).await.unwrap();
        assert!(data.is_empty());
    }

    #[actix_web::test]
    async fn identical_predictions_render_identical_pages() {
        let prediction = Prediction {
            label: "Late Blight",
            confidence: 61.25,
        };
        let first = body_text(respond(Ok(prediction.clone()))).await;
        let second = body_text(respond(Ok(prediction))).await;
        assert_eq!(first, second);
    }

    #[actix_web::test]
    async fn success_renders_label_and_confidence() {
        let resp = respond(Ok(Prediction {
            label: "Healthy",
            confidence: 93.7,
        }));
        assert_eq!(resp.status(), StatusCode::OK);

        let page = body_text(resp).await;
        assert!(page.contains("Healthy"));
        assert!(page.contains("93.70"));
    }

    #[actix_web::test]
    async fn shape_mismatch_renders_error_page_as_http_200() {
        let resp = respond(Err(ClassifyError::ShapeMismatch {
            width: 128,
            height: 64,
        }));
        assert_eq!(resp.status(), StatusCode::OK);

        let page = body_text(resp).await;
        assert!(page.contains("Error"));
        assert!(page.contains("0.00"));
    }

    #[actix_web::test]
    async fn decode_failure_renders_error_page_as_http_200() {
        let decode_err = image::load_from_memory(&[]).unwrap_err();
        let resp = respond(Err(ClassifyError::Decode(decode_err)));
        assert_eq!(resp.status(), StatusCode::OK);

        let page = body_text(resp).await;
        assert!(page.contains("Error"));
        assert!(page.contains("0.00"));
    }
}
