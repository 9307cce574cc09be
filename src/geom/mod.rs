mod fishnet;

pub use fishnet::{Fishnet, PolygonCell};
