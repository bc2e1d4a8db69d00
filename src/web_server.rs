use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::{LanguageConfig, ServerConfig};
use crate::queue::JobQueue;
use crate::routes::{get_submission_handler, json_error_handler, post_submission_handler};

pub fn build_server(
    config: ServerConfig,
    languages: Arc<Vec<LanguageConfig>>,
    db_pool: Arc<SqlitePool>,
    job_queue: Arc<JobQueue>,
) -> std::io::Result<Server> {
    let db_pool = web::Data::from(db_pool);
    let languages = web::Data::from(languages);
    let job_queue = web::Data::from(job_queue);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(languages.clone())
            .app_data(job_queue.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .service(
                web::resource("/api/submissions").route(web::post().to(post_submission_handler)),
            )
            .service(
                web::resource("/api/submissions/{submission_id}")
                    .route(web::get().to(get_submission_handler)),
            )
    })
    .bind((
        config.bind_address.unwrap_or("127.0.0.1".to_string()),
        config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
