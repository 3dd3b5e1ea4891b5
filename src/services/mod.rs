pub mod credential_service;
