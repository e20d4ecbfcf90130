mod sandbox;
mod utils;
