use syn::{Field, FieldsNamed, Token, Type, punctuated::Punctuated};

/// 确保具名字段结构体包含所需字段
/// - 缺失时追加在最前，已存在时保留原定义与位置
pub(crate) fn ensure_field(fields_named: &mut FieldsNamed, name: &syn::Ident, ty: &Type) {
    if has_field_named(fields_named, name) {
        return;
    }

    let mut new_named: Punctuated<Field, Token![,]> = Punctuated::new();
    new_named.push(syn::parse_quote! { #name: #ty });
    for f in fields_named.named.clone().into_iter() {
        new_named.push(f);
    }
    fields_named.named = new_named;
}

pub(crate) fn has_field_named(fields: &FieldsNamed, name: &syn::Ident) -> bool {
    fields
        .named
        .iter()
        .any(|f| f.ident.as_ref().map(|i| i == name).unwrap_or(false))
}

/// 除 `skip` 以外的全部字段名，保持声明顺序
pub(crate) fn other_field_idents<'a>(
    fields: &'a FieldsNamed,
    skip: &'a syn::Ident,
) -> impl Iterator<Item = &'a syn::Ident> + 'a {
    fields
        .named
        .iter()
        .filter_map(|f| f.ident.as_ref())
        .filter(move |i| *i != skip)
}
