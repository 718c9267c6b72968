use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, Variant};

/// Implementation of `#[derive(CapabilityInfo)]`.
///
/// Expects a fieldless enum whose variants each carry
/// `#[capability(token = "...", risk = "low|medium|high", description = "...")]`.
/// Generates `token()`, `risk_tier()`, `description()`, and `from_token()`
/// inherent methods — the same per-capability metadata the manifest's
/// capability taxonomy carries, without hand-writing four parallel match arms.
pub fn derive_capability_info(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "CapabilityInfo can only be derived for enums",
        ));
    };

    let enum_name = &input.ident;
    let mut tokens = Vec::with_capacity(data.variants.len());
    let mut risks = Vec::with_capacity(data.variants.len());
    let mut descriptions = Vec::with_capacity(data.variants.len());
    let mut variant_idents = Vec::with_capacity(data.variants.len());

    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "CapabilityInfo variants must be fieldless",
            ));
        }
        let attr = find_capability_attr(variant)?;
        variant_idents.push(&variant.ident);
        tokens.push(attr.token);
        risks.push(attr.risk_ident());
        descriptions.push(attr.description);
    }

    Ok(quote! {
        impl #enum_name {
            /// The manifest JSON token for this capability (e.g. `"config.read"`).
            pub fn token(&self) -> &'static str {
                match self {
                    #( Self::#variant_idents => #tokens, )*
                }
            }

            /// The audit/display risk tier for this capability.
            pub fn risk_tier(&self) -> crate::manifest::schema::RiskTier {
                match self {
                    #( Self::#variant_idents => crate::manifest::schema::RiskTier::#risks, )*
                }
            }

            /// A human-readable description of what this capability grants.
            pub fn description(&self) -> &'static str {
                match self {
                    #( Self::#variant_idents => #descriptions, )*
                }
            }

            /// Parses a capability from its manifest JSON token.
            pub fn from_token(token: &str) -> Option<Self> {
                match token {
                    #( #tokens => Some(Self::#variant_idents), )*
                    _ => None,
                }
            }
        }
    })
}

struct CapabilityAttr {
    token: LitStr,
    risk: String,
    description: LitStr,
}

impl CapabilityAttr {
    fn risk_ident(&self) -> syn::Ident {
        let name = match self.risk.as_str() {
            "low" => "Low",
            "medium" => "Medium",
            "high" => "High",
            other => other,
        };
        syn::Ident::new(name, proc_macro2::Span::call_site())
    }
}

fn find_capability_attr(variant: &Variant) -> syn::Result<CapabilityAttr> {
    let mut token = None;
    let mut risk = None;
    let mut description = None;

    for attr in &variant.attrs {
        if !attr.path().is_ident("capability") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("token") {
                token = Some(meta.value()?.parse::<LitStr>()?);
            } else if meta.path.is_ident("risk") {
                let lit = meta.value()?.parse::<LitStr>()?;
                risk = Some(lit.value());
            } else if meta.path.is_ident("description") {
                description = Some(meta.value()?.parse::<LitStr>()?);
            }
            Ok(())
        })?;
    }

    let token = token.ok_or_else(|| {
        syn::Error::new_spanned(variant, "missing `#[capability(token = \"...\")]`")
    })?;
    let risk = risk
        .ok_or_else(|| syn::Error::new_spanned(variant, "missing `#[capability(risk = \"...\")]`"))?;
    let description = description.ok_or_else(|| {
        syn::Error::new_spanned(variant, "missing `#[capability(description = \"...\")]`")
    })?;

    Ok(CapabilityAttr {
        token,
        risk,
        description,
    })
}
