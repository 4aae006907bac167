//! モデル定義
//!
//! stackflowで使用される宣言モデルを定義します。

mod declaration;
mod projection;
mod stack;

// Re-exports
pub use declaration::*;
pub use projection::*;
pub use stack::*;
