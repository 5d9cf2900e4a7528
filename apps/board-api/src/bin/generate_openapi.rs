use utoipa::OpenApi;

fn main() {
    let spec = match board_api::routes::ApiDoc::openapi().to_pretty_json() {
        Ok(spec) => spec,
        Err(err) => {
            eprintln!("failed to serialise OpenAPI document: {err}");
            std::process::exit(1);
        }
    };

    let out = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/board-api.json");
    if let Some(parent) = out.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("failed to create {}: {err}", parent.display());
            std::process::exit(1);
        }
    }
    if let Err(err) = std::fs::write(&out, spec) {
        eprintln!("failed to write {}: {err}", out.display());
        std::process::exit(1);
    }
    println!("Wrote {}", out.display());
}
