//! Procedural macros for Flowsmith operations
//!
//! `#[operation_group]` and `#[operation]` turn a plain struct with a `deps`
//! field into a registered operation: metadata constants, an axum route and
//! the JSON schema the CLI builds its arguments from.
//!
//! Generated code refers to the caller's crate by path: `super::Dependencies`
//! from inside a group module, `super::super::{OperationRegistry,
//! OperationMetadata, HasMetadata}` from the `core` module, and
//! `crate::http::AppError` for route errors.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{
    Attribute, Expr, ExprLit, Fields, Ident, Item, ItemMod, ItemStruct, Lit, Meta, MetaNameValue,
    Path, Token, parse_macro_input,
};

/// Marks an operation group module
///
/// Usage: `#[operation_group(automations)]`
///
/// Every struct in the module with a `deps` field is treated as an operation.
#[proc_macro_attribute]
pub fn operation_group(attr: TokenStream, item: TokenStream) -> TokenStream {
    let group = parse_macro_input!(attr as Ident);
    let module = parse_macro_input!(item as ItemMod);

    expand_group(&group, module)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Marks one operation struct inside a group
///
/// Usage: `#[operation(name = "get_saved_flow", input = IdInput,
/// http = "GET /saved-flows/{id}", cli = "saved-flows get <ID>")]`
#[proc_macro_attribute]
pub fn operation(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as OperationArgs);
    let target = parse_macro_input!(item as ItemStruct);

    expand_operation(args, target)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ============================================================================
// Groups
// ============================================================================

fn expand_group(group: &Ident, module: ItemMod) -> syn::Result<TokenStream2> {
    let ItemMod {
        attrs,
        vis,
        ident,
        content,
        ..
    } = module;
    let Some((_, items)) = content else {
        return Err(syn::Error::new_spanned(
            &ident,
            "operation_group needs an inline module body",
        ));
    };

    let group_name = group.to_string();
    let operations: Vec<&Ident> = items
        .iter()
        .filter_map(|item| match item {
            Item::Struct(s) if has_deps_field(s) => Some(&s.ident),
            _ => None,
        })
        .collect();

    Ok(quote! {
        #(#attrs)*
        #vis mod #ident {
            pub const GROUP_NAME: &str = #group_name;

            #(#items)*

            /// Register every operation of this group
            pub fn register_all(
                registry: &mut super::super::OperationRegistry,
                deps: std::sync::Arc<super::Dependencies>,
            ) {
                #( registry.register(#operations::new(deps.clone()), #operations::OPERATION_NAME); )*
            }

            /// Metadata of every operation of this group, no dependencies needed
            pub fn operation_metadata() -> Vec<super::super::OperationMetadata> {
                vec![#( <#operations as super::super::HasMetadata>::metadata() ),*]
            }

            /// One router holding the routes of this group
            pub fn register_http_routes(deps: std::sync::Arc<super::Dependencies>) -> axum::Router {
                axum::Router::new()
                    #( .merge(#operations::http_route(deps.clone())) )*
            }
        }
    })
}

fn has_deps_field(item: &ItemStruct) -> bool {
    match &item.fields {
        Fields::Named(named) => named
            .named
            .iter()
            .any(|field| field.ident.as_ref().is_some_and(|name| name == "deps")),
        _ => false,
    }
}

// ============================================================================
// Operations
// ============================================================================

/// `key = value` pairs accepted by `#[operation]`
#[derive(Default)]
struct OperationArgs {
    name: Option<String>,
    description: Option<String>,
    group: Option<String>,
    http: Option<Route>,
    cli: Option<String>,
    input: Option<Path>,
}

impl Parse for OperationArgs {
    fn parse(stream: ParseStream) -> syn::Result<Self> {
        let pairs = Punctuated::<MetaNameValue, Token![,]>::parse_terminated(stream)?;
        let mut args = OperationArgs::default();

        for pair in pairs {
            let key = pair
                .path
                .get_ident()
                .map(Ident::to_string)
                .unwrap_or_default();
            match key.as_str() {
                "name" => args.name = Some(string_value(&pair.value)?),
                "description" => args.description = Some(string_value(&pair.value)?),
                "group" => args.group = Some(string_value(&pair.value)?),
                "cli" => args.cli = Some(string_value(&pair.value)?),
                "http" => args.http = Some(Route::parse(&string_value(&pair.value)?)),
                "input" => match pair.value {
                    Expr::Path(expr) => args.input = Some(expr.path),
                    other => {
                        return Err(syn::Error::new_spanned(other, "input expects a type name"));
                    }
                },
                _ => return Err(syn::Error::new_spanned(&pair.path, "Unknown attribute")),
            }
        }
        Ok(args)
    }
}

fn string_value(value: &Expr) -> syn::Result<String> {
    match value {
        Expr::Lit(ExprLit {
            lit: Lit::Str(text),
            ..
        }) => Ok(text.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn expand_operation(args: OperationArgs, target: ItemStruct) -> syn::Result<TokenStream2> {
    let ItemStruct {
        attrs,
        vis,
        ident,
        fields,
        ..
    } = target;

    let name = args
        .name
        .unwrap_or_else(|| snake_case(&ident.to_string()));
    let description = args.description.unwrap_or_else(|| {
        let doc = doc_text(&attrs);
        if doc.is_empty() {
            format!("{} operation", ident)
        } else {
            doc
        }
    });
    let group = match &args.group {
        Some(group) => quote! { #group },
        None => quote! { GROUP_NAME },
    };
    let cli = optional_str(args.cli.as_deref());
    let http_method = optional_str(args.http.as_ref().map(|r| r.method.as_str()));
    let http_path = optional_str(args.http.as_ref().map(|r| r.path.as_str()));
    let route_fn = match &args.http {
        Some(route) => route.router_fn(args.input.as_ref()),
        None => quote! {
            /// This operation has no HTTP route
            pub fn http_route(_deps: std::sync::Arc<super::Dependencies>) -> axum::Router {
                axum::Router::new()
            }
        },
    };
    let schema = schema_expr(args.input.as_ref());

    Ok(quote! {
        #[derive(Clone)]
        #(#attrs)*
        #vis struct #ident #fields

        impl #ident {
            pub const OPERATION_NAME: &'static str = #name;
            pub const DESCRIPTION: &'static str = #description;
            pub const GROUP: &'static str = #group;
            pub const HTTP_METHOD: Option<&'static str> = #http_method;
            pub const HTTP_PATH: Option<&'static str> = #http_path;
            pub const CLI_PATTERN: Option<&'static str> = #cli;

            pub fn new(deps: std::sync::Arc<super::Dependencies>) -> Self {
                Self { deps }
            }

            #route_fn
        }

        impl super::super::HasMetadata for #ident {
            fn metadata() -> super::super::OperationMetadata {
                super::super::OperationMetadata {
                    name: Self::OPERATION_NAME,
                    description: Self::DESCRIPTION,
                    group: Self::GROUP,
                    http_method: Self::HTTP_METHOD,
                    http_path: Self::HTTP_PATH,
                    cli_pattern: Self::CLI_PATTERN,
                    schema: #schema,
                }
            }
        }
    })
}

fn optional_str(value: Option<&str>) -> TokenStream2 {
    match value {
        Some(text) => quote! { Some(#text) },
        None => quote! { None },
    }
}

/// `/// doc` lines joined into one sentence
fn doc_text(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(MetaNameValue {
                value:
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(text),
                        ..
                    }),
                ..
            }) => Some(text.value().trim().to_string()),
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `SaveFlow` -> `save_flow`
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_uppercase() && !out.is_empty() {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Input schema as a JSON object, computed once per operation
///
/// Without an input type, or if schemars output is not an object, the
/// schema is an open object.
fn schema_expr(input: Option<&Path>) -> TokenStream2 {
    let generated = match input {
        Some(ty) => quote! { serde_json::to_value(schemars::schema_for!(#ty)).ok() },
        None => quote! { None::<serde_json::Value> },
    };

    quote! {{
        static SCHEMA: std::sync::OnceLock<serde_json::Map<String, serde_json::Value>> =
            std::sync::OnceLock::new();
        SCHEMA
            .get_or_init(|| match #generated {
                Some(serde_json::Value::Object(map)) => map,
                _ => {
                    let mut open = serde_json::Map::new();
                    open.insert("type".into(), serde_json::Value::from("object"));
                    open.insert("properties".into(), serde_json::Value::Object(Default::default()));
                    open.insert("additionalProperties".into(), serde_json::Value::Bool(true));
                    open
                }
            })
            .clone()
    }}
}

// ============================================================================
// HTTP routes
// ============================================================================

/// `"POST /automations/{id}/start"` split into its parts
struct Route {
    method: String,
    path: String,
    params: Vec<String>,
}

impl Route {
    /// A bare path means GET
    fn parse(spec: &str) -> Self {
        let (method, path) = match spec.trim().split_once(' ') {
            Some((method, path)) => (method.to_uppercase(), path.trim().to_string()),
            None => ("GET".to_string(), spec.trim().to_string()),
        };
        let params = path
            .split('/')
            .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
            .map(str::to_string)
            .collect();
        Route {
            method,
            path,
            params,
        }
    }

    fn reads_query(&self) -> bool {
        self.params.is_empty() && matches!(self.method.as_str(), "GET" | "DELETE")
    }

    /// `http_route(deps)` building this operation's axum router
    fn router_fn(&self, input: Option<&Path>) -> TokenStream2 {
        let method = Ident::new(&self.method.to_lowercase(), Span::call_site());
        let (extractors, build_input) = match input {
            None => (quote! {}, quote! { () }),
            Some(ty) if self.reads_query() => (
                quote! { axum::extract::Query(input): axum::extract::Query<#ty> },
                quote! { input },
            ),
            Some(ty) => self.body_input(ty),
        };

        quote! {
            /// HTTP route for this operation
            pub fn http_route(deps: std::sync::Arc<super::Dependencies>) -> axum::Router {
                let handler = move |#extractors| async move {
                    let op = Self::new(deps.clone());
                    let output = op
                        .execute(#build_input)
                        .await
                        .map_err(crate::http::AppError::from)?;
                    Ok::<_, crate::http::AppError>(axum::Json(output))
                };
                axum::Router::new().route(
                    Self::HTTP_PATH.unwrap_or_default(),
                    axum::routing::#method(handler),
                )
            }
        }
    }

    /// Optional JSON object body with path parameters merged in as strings
    fn body_input(&self, ty: &Path) -> (TokenStream2, TokenStream2) {
        let (path_extractor, merge_params) = if self.params.is_empty() {
            (quote! {}, quote! {})
        } else {
            (
                quote! {
                    axum::extract::Path(params):
                        axum::extract::Path<std::collections::HashMap<String, String>>,
                },
                quote! {
                    if let Some(fields) = value.as_object_mut() {
                        for (key, value) in params {
                            fields.insert(key, serde_json::Value::String(value));
                        }
                    }
                },
            )
        };
        let reject = |message: TokenStream2| {
            quote! { crate::http::AppError::from(crate::FlowsmithError::validation(#message)) }
        };
        let bad_json = reject(quote! { format!("Invalid JSON body: {}", e) });
        let not_object = reject(quote! { "Request body must be a JSON object" });
        let bad_input = reject(quote! { format!("Invalid input: {}", e) });

        (
            quote! { #path_extractor body: axum::body::Bytes },
            quote! {{
                let mut value = if body.is_empty() {
                    serde_json::Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_slice::<serde_json::Value>(&body).map_err(|e| #bad_json)?
                };
                if !value.is_object() {
                    return Err(#not_object);
                }
                #merge_params
                serde_json::from_value::<#ty>(value).map_err(|e| #bad_input)?
            }},
        )
    }
}
