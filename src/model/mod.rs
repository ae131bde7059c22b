pub mod autoencoder;
pub mod mae;
pub mod masking;
