use proc_macro::TokenStream;

mod event;
mod utils;

/// 事件宏
/// - 作用于单元结构体或具名字段结构体，追加字段 `data: ::eventline::event::EventData`（若缺失）
/// - 自动实现 `::eventline::event::EventSpec`（`TYPE_NAME/REQUIRED_KEYS/from_data/data`）
/// - 其余字段在 `from_data` 中以 `Default::default()` 初始化
/// - 支持参数：`#[event(type_name = "Signup", required = ["email"])]`，
///   `type_name` 默认取结构体名
///
/// 处理钩子仍需手写：`impl Event for Signup {}` 或覆写 `handle/handle_external`。
#[proc_macro_attribute]
pub fn event(attr: TokenStream, item: TokenStream) -> TokenStream {
    event::expand(attr, item)
}
