use std::env;
use std::io;

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, post, web};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use story_gen_core::model::generator::{MAX_STORY_TOKENS, MIN_STORY_TOKENS, StoryGenerator};

/// Request body for the `/v1/generate` endpoint.
#[derive(Deserialize)]
struct GenerateRequest {
	/// Starting text for the story.
	prefix: String,
	/// Number of tokens to generate, defaults to 500.
	max_length: Option<usize>,
	/// Optional seed for reproducible output.
	seed: Option<u64>,
}

#[derive(Serialize)]
struct GenerateResponse {
	story: String,
	prefix: String,
	tokens_generated: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
	error: String,
}

#[derive(Serialize)]
struct HealthResponse {
	status: &'static str,
	vocab_size: usize,
	bigram_contexts: usize,
	trigram_contexts: usize,
}

/// HTTP POST endpoint `/v1/generate`
///
/// Validates the request, generates a continuation for the prefix and
/// returns it as JSON. Validation failures are 400s with a structured
/// error body; no partial story is ever returned.
#[post("/v1/generate")]
async fn post_generate(
	data: web::Data<StoryGenerator>,
	body: web::Json<GenerateRequest>,
) -> impl Responder {
	let prefix = body.prefix.trim();
	if prefix.is_empty() {
		return HttpResponse::BadRequest().json(ErrorResponse {
			error: "Missing or empty 'prefix' field".to_owned(),
		});
	}

	let max_length = body.max_length.unwrap_or(500);
	if !(MIN_STORY_TOKENS..=MAX_STORY_TOKENS).contains(&max_length) {
		return HttpResponse::BadRequest().json(ErrorResponse {
			error: format!(
				"max_length must be between {MIN_STORY_TOKENS} and {MAX_STORY_TOKENS}"
			),
		});
	}

	// Every request draws from its own random source; a caller-supplied
	// seed makes the output reproducible.
	let mut rng = match body.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_os_rng(),
	};

	match data.generate(prefix, max_length, &mut rng) {
		Ok(story) => {
			log::debug!("generated {} characters for {:?}", story.len(), prefix);
			HttpResponse::Ok().json(GenerateResponse {
				tokens_generated: story.split_whitespace().count(),
				prefix: prefix.to_owned(),
				story,
			})
		}
		Err(e) => HttpResponse::InternalServerError().json(ErrorResponse {
			error: e.to_string(),
		}),
	}
}

/// HTTP GET endpoint `/v1/health`
///
/// Reports that the service is up, along with the shape of the loaded
/// model.
#[get("/v1/health")]
async fn get_health(data: web::Data<StoryGenerator>) -> impl Responder {
	let counts = data.model().counts();
	HttpResponse::Ok().json(HealthResponse {
		status: "running",
		vocab_size: data.tokenizer().vocabulary().len(),
		bigram_contexts: counts.bigram_contexts(),
		trigram_contexts: counts.trigram_contexts(),
	})
}

/// Main entry point for the server.
///
/// Loads the artifact bundle once, shares it read-only across workers and
/// starts the HTTP server. A failed load is fatal: the service refuses to
/// start rather than serve with a partial model.
///
/// # Notes
/// - `STORY_GEN_DATA` overrides the artifact directory (default `./data`).
/// - `STORY_GEN_ADDR` overrides the bind address (default 127.0.0.1:5000).
#[actix_web::main]
async fn main() -> io::Result<()> {
	env_logger::init();

	let data_dir = env::var("STORY_GEN_DATA").unwrap_or_else(|_| "./data".to_owned());
	let addr = env::var("STORY_GEN_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_owned());

	let generator = StoryGenerator::load(&data_dir).map_err(|e| {
		log::error!("cannot start without a complete artifact bundle: {e}");
		io::Error::other(e.to_string())
	})?;
	// The bundle is immutable: shared by reference, no lock needed.
	let shared = web::Data::new(generator);

	log::info!("serving on {addr} with artifacts from {data_dir}");
	HttpServer::new(move || {
		App::new()
			.wrap(Cors::permissive())
			.app_data(shared.clone())
			.service(post_generate)
			.service(get_health)
	})
	.bind(addr)?
	.run()
	.await
}
