use crate::utils::{ensure_field, other_field_idents};
use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, Fields, Ident, Item, LitStr, Result, Token, Type, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

/// #[event] 宏实现
/// - 仅支持单元结构体与具名字段结构体
/// - 确保存在字段：`data: ::eventline::event::EventData`
/// - 生成 `::eventline::event::EventSpec` 实现
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[event] can only be used on struct types")
                .to_compile_error()
                .into();
        }
    };

    // 单元结构体改写为具名字段结构体
    if matches!(st.fields, Fields::Unit) {
        st.fields = Fields::Named(syn::parse_quote!({}));
        st.semi_token = None;
    }

    let data_ident = Ident::new("data", Span::call_site());
    let data_ty: Type = syn::parse_quote!(::eventline::event::EventData);

    let fields_named = match &mut st.fields {
        Fields::Named(f) => f,
        other => {
            return syn::Error::new(
                other.span(),
                "#[event] supports only unit or named-field structs, e.g., struct Signup;",
            )
            .to_compile_error()
            .into();
        }
    };
    ensure_field(fields_named, &data_ident, &data_ty);
    let others: Vec<Ident> = other_field_idents(fields_named, &data_ident)
        .cloned()
        .collect();

    let ident = &st.ident;
    let type_lit = cfg
        .type_name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let type_name = type_lit.value();
    if type_name.is_empty() || type_name.contains('.') {
        return syn::Error::new(
            type_lit.span(),
            "'type_name' must be non-empty and must not contain '.'",
        )
        .to_compile_error()
        .into();
    }
    let required = cfg.required;

    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let out = quote! {
        #st

        impl #impl_generics ::eventline::event::EventSpec for #ident #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_lit;
            const REQUIRED_KEYS: &'static [&'static str] = &[#( #required ),*];

            fn from_data(data: ::eventline::event::EventData) -> Self {
                Self {
                    #data_ident: data,
                    #( #others: ::core::default::Default::default(), )*
                }
            }

            fn data(&self) -> &::eventline::event::EventData {
                &self.#data_ident
            }
        }
    };

    TokenStream::from(out)
}

// 结构体级配置：类型名、必需键
struct EventAttrConfig {
    type_name: Option<LitStr>,
    required: Vec<LitStr>,
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut type_name: Option<LitStr> = None;
        let mut required: Option<Vec<LitStr>> = None;

        if input.is_empty() {
            return Ok(Self {
                type_name,
                required: Vec::new(),
            });
        }

        let pairs: Punctuated<syn::ExprAssign, Token![,]> =
            Punctuated::<syn::ExprAssign, Token![,]>::parse_terminated(input)?;

        for assign in pairs.into_iter() {
            let key_ident = match *assign.left {
                Expr::Path(p) if p.path.segments.len() == 1 => p.path.segments[0].ident.clone(),
                other => return Err(syn::Error::new(other.span(), "invalid attribute key")),
            };
            match key_ident.to_string().as_str() {
                "type_name" => {
                    if type_name.is_some() {
                        return Err(syn::Error::new(
                            key_ident.span(),
                            "duplicate key 'type_name' in attribute",
                        ));
                    }
                    type_name = Some(expect_str(*assign.right, "type_name")?);
                }
                "required" => {
                    if required.is_some() {
                        return Err(syn::Error::new(
                            key_ident.span(),
                            "duplicate key 'required' in attribute",
                        ));
                    }
                    let keys = match *assign.right {
                        Expr::Array(array) => array
                            .elems
                            .into_iter()
                            .map(|elem| expect_str(elem, "required"))
                            .collect::<Result<Vec<_>>>()?,
                        other => {
                            return Err(syn::Error::new(
                                other.span(),
                                "expected an array of string literals for 'required'",
                            ));
                        }
                    };
                    required = Some(keys);
                }
                _ => {
                    return Err(syn::Error::new(
                        key_ident.span(),
                        "unknown key; expected 'type_name' | 'required'",
                    ));
                }
            }
        }

        Ok(Self {
            type_name,
            required: required.unwrap_or_default(),
        })
    }
}

fn expect_str(expr: Expr, key: &str) -> Result<LitStr> {
    match expr {
        Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => Ok(lit),
        other => Err(syn::Error::new(
            other.span(),
            format!("expected string literal for '{key}'"),
        )),
    }
}
