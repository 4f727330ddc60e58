// Swap route codec
// Packed path decoding and route display helpers
//
// Numan Thabit 2025 Nov

pub mod path;
pub mod route;

pub use path::{decode_swap_path, decode_swap_path_strict, SwapPath, SwapPathError};
pub use route::{render_route, route_symbols, RouteSource, TextDirection, TokenDirectory};
