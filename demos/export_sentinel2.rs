use anyhow::Result;
use gee_export::{
    CancelToken, ExportOptions, Session, Settings, Snippet, export_snippet, load_config,
};

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Needs GEE_PROJECT_ID, GCS_BUCKET_NAME and GEE_ACCESS_TOKEN (or cached credentials).
    let config = load_config(Settings::default())?;
    let session = Session::connect(&config)?;

    let snippet = Snippet::parse(include_str!("sentinel2_snippet.json"))?;
    let options = ExportOptions::new(&config.bucket);

    let url = export_snippet(&session, snippet, &options, &CancelToken::new())?;
    println!("{url}");
    Ok(())
}
