//! Minimal records API
//!
//! Serves the stock `recid` endpoint over in-memory collaborators, with
//! writes opened to everyone and a YAML representation next to JSON.
//!
//! ```text
//! curl -X POST localhost:5000/records/ -H 'content-type: application/json' \
//!      -d '{"title": "Rust in Action", "type": "book"}'
//! curl localhost:5000/records/1
//! curl 'localhost:5000/records/?q=rust&sort=mostrecent'
//! curl 'localhost:5000/records/1?format=yaml'
//! ```

use records_rest::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("records_rest=debug,tower_http=info")),
        )
        .init();

    let mut config = RestConfig::default_config();
    if let Some(endpoint) = config.endpoints.get_mut("recid") {
        endpoint.create_permission_factory = Some("allow_all".to_string());
        endpoint.update_permission_factory = Some("allow_all".to_string());
        endpoint.delete_permission_factory = Some("allow_all".to_string());
        endpoint.use_options_view = true;

        for bindings in [&mut endpoint.record_serializers, &mut endpoint.search_serializers] {
            bindings.insert("application/x-yaml".to_string(), "yaml".to_string());
        }
        for aliases in [
            &mut endpoint.record_serializers_aliases,
            &mut endpoint.search_serializers_aliases,
        ] {
            aliases.insert("yaml".to_string(), "application/x-yaml".to_string());
        }
    }

    println!("📚 Records API");
    println!("   GET/POST          /records/");
    println!("   GET/PUT/PATCH/DEL /records/{{pid_value}}");
    println!("   GET               /records/_options\n");

    ServerBuilder::new()
        .with_config(config)
        .in_memory()
        .with_cors()
        .serve("127.0.0.1:5000")
        .await
}
