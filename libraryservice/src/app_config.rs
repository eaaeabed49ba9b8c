use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::web::{JsonConfig, QueryConfig};
use actix_web::HttpRequest;
use paperclip::actix::web;

use crate::error::ApiError;
use crate::handlers::{self, auth, books, borrows};

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/health").route(web::get().to(handlers::health)))
            .service(
                web::scope("/auth")
                    .service(web::resource("/register").route(web::post().to(auth::register)))
                    .service(web::resource("/login").route(web::post().to(auth::login)))
                    .service(
                        web::resource("/profile")
                            .route(web::get().to(auth::get_profile))
                            .route(web::put().to(auth::update_profile)),
                    )
                    .service(web::resource("/users").route(web::get().to(auth::list_users))),
            )
            .service(
                web::scope("/books")
                    .service(
                        web::resource("")
                            .route(web::get().to(books::list_books))
                            .route(web::post().to(books::add_book)),
                    )
                    .service(
                        web::resource("/{book_id}")
                            .route(web::get().to(books::get_book))
                            .route(web::put().to(books::update_book))
                            .route(web::delete().to(books::delete_book)),
                    ),
            )
            .service(
                web::scope("/borrow")
                    .service(
                        web::resource("")
                            .route(web::get().to(borrows::list_borrows))
                            .route(web::post().to(borrows::create_borrow)),
                    )
                    // registered before "/{borrow_id}" so they are not taken for ids
                    .service(web::resource("/me").route(web::get().to(borrows::my_borrows)))
                    .service(
                        web::resource("/user/{user_id}")
                            .route(web::get().to(borrows::user_borrows)),
                    )
                    .service(
                        web::resource("/{borrow_id}")
                            .route(web::delete().to(borrows::delete_borrow)),
                    )
                    .service(
                        web::resource("/{borrow_id}/approve")
                            .route(web::put().to(borrows::approve_borrow)),
                    )
                    .service(
                        web::resource("/{borrow_id}/reject")
                            .route(web::put().to(borrows::reject_borrow)),
                    )
                    .service(
                        web::resource("/{borrow_id}/extend")
                            .route(web::put().to(borrows::extend_borrow)),
                    )
                    .service(
                        web::resource("/{borrow_id}/return")
                            .route(web::put().to(borrows::return_borrow)),
                    ),
            ),
    );
}

/// Renders malformed JSON bodies as `{"message": ...}` like every other failure
pub fn json_config() -> JsonConfig {
    JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        ApiError::BadRequest(err.to_string()).into()
    })
}

pub fn query_config() -> QueryConfig {
    QueryConfig::default().error_handler(|err: QueryPayloadError, _req: &HttpRequest| {
        ApiError::BadRequest(err.to_string()).into()
    })
}
