pub mod ingest_routes;
