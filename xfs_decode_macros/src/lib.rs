use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, parse_macro_input};

fn make_error(ident: &Ident, msg: &str) -> TokenStream {
    syn::Error::new_spanned(ident, msg)
        .to_compile_error()
        .into()
}

/// Derives `xfs_decode::Decode` for a plain struct by decoding each field in
/// declaration order and accumulating the consumed byte offset, the same
/// pattern used by the hand-written record decoders in this crate.
#[proc_macro_derive(XfsDecode)]
pub fn derive_xfs_decode(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident,
        generics,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let data_struct = match data {
        Data::Struct(data_struct) => data_struct,
        _ => return make_error(&ident, "XfsDecode can only be derived for structs"),
    };

    let fields = match data_struct.fields {
        Fields::Named(named) => named.named,
        _ => return make_error(&ident, "XfsDecode requires named fields"),
    };

    let field_idents: Vec<&Ident> = fields
        .iter()
        .map(|f| f.ident.as_ref().expect("named field"))
        .collect();
    let field_types = fields.iter().map(|f| &f.ty);

    let decode_stmts = field_idents.iter().zip(field_types).map(|(name, ty)| {
        quote! {
            let (#name, __consumed) = <#ty as ::xfs_decode::Decode>::decode(&input[__acc..])?;
            __acc += __consumed;
        }
    });

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::xfs_decode::Decode for #ident #ty_generics #where_clause {
            fn decode(input: &[u8]) -> ::core::result::Result<(Self, usize), ::xfs_decode::DecodeError> {
                let mut __acc: usize = 0;
                #( #decode_stmts )*
                Ok((
                    #ident {
                        #( #field_idents ),*
                    },
                    __acc,
                ))
            }
        }
    };

    expanded.into()
}
