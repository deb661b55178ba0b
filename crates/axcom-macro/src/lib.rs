//! Procedural macros for COM interface interop
//!
//! Provides:
//! - `#[com_interface("guid")]` - Define a COM interface with IUnknown base
//! - `#[com_implement(Interface)]` - Implement a COM interface for a struct
//!
//! ## Calling Convention
//!
//! Every generated function pointer uses `extern "system"`:
//! - x86: `stdcall` (this on stack)
//! - x64: `C` (this as first param)
//!
//! ## Object model
//!
//! `#[com_implement]` does not generate reference counting or `QueryInterface`
//! logic per interface. The three IUnknown slots of every implemented interface
//! forward to the struct's `axcom::ComObject` implementation, so a struct
//! carrying several vtable pointers answers `QueryInterface` consistently and
//! frees itself exactly once.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, FnArg, Ident, ImplItem, ItemImpl, ItemTrait, LitStr, Pat, ReturnType, Token,
    TraitItem, Type,
    parse::{Parse, ParseStream},
    parse_macro_input,
    spanned::Spanned,
};

/// Returns the path to the axcom crate based on the `internal` flag.
///
/// When `internal` is true (used inside the axcom crate itself), this returns `crate`.
/// When `internal` is false (external crates), this returns `::axcom`.
fn crate_path(internal: bool) -> TokenStream2 {
    if internal {
        quote! { crate }
    } else {
        quote! { ::axcom }
    }
}

// =============================================================================
// Validation helpers for FFI-safety
// =============================================================================

/// Check if a type is known to be non-FFI-safe
fn check_ffi_safe_type(ty: &Type) -> Result<(), String> {
    match ty {
        Type::Path(type_path) => {
            if let Some(segment) = type_path.path.segments.last() {
                let name = segment.ident.to_string();
                match name.as_str() {
                    "String" | "str" => {
                        return Err(format!("{} is not FFI-safe. Use BSTR or *const u16", name));
                    }
                    "Vec" => {
                        return Err(
                            "Vec<T> is not FFI-safe. Use *mut T and a length parameter instead"
                                .into(),
                        );
                    }
                    "Box" => return Err("Box<T> is not FFI-safe. Use *mut T instead".into()),
                    "Rc" | "Arc" => {
                        return Err(format!("{} is not FFI-safe. Use raw pointers instead", name));
                    }
                    "Result" => {
                        return Err("Result<T, E> is not FFI-safe. Return an HRESULT instead".into());
                    }
                    _ => {}
                }
            }
        }
        Type::Reference(_) => {
            return Err(
                "references are not allowed across the COM boundary. Use *const T or *mut T"
                    .into(),
            );
        }
        Type::Slice(_) => {
            return Err("slices are not FFI-safe. Use *mut T and a length parameter".into());
        }
        Type::TraitObject(_) => return Err("trait objects (dyn Trait) are not FFI-safe".into()),
        Type::ImplTrait(_) => return Err("impl Trait is not FFI-safe".into()),
        Type::Tuple(tuple) if !tuple.elems.is_empty() => {
            return Err("non-empty tuples are not FFI-safe. Use a #[repr(C)] struct".into());
        }
        _ => {}
    }
    Ok(())
}

/// Validate a signature shared by trait and impl methods
fn validate_signature(sig: &syn::Signature) -> Result<(), syn::Error> {
    let method_name = &sig.ident;
    let span = method_name.span();

    if sig.asyncness.is_some() {
        return Err(syn::Error::new(
            span,
            format!("method '{}': async functions cannot be COM methods", method_name),
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            span,
            format!("method '{}': generic methods cannot be COM methods", method_name),
        ));
    }
    if sig.variadic.is_some() {
        return Err(syn::Error::new(
            span,
            format!("method '{}': variadic methods cannot be COM methods", method_name),
        ));
    }

    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver)) => {
            if receiver.reference.is_none() || receiver.mutability.is_some() {
                return Err(syn::Error::new(
                    receiver.span(),
                    format!(
                        "method '{}': COM methods take `&self`; use interior mutability for state",
                        method_name
                    ),
                ));
            }
        }
        _ => {
            return Err(syn::Error::new(
                span,
                format!("method '{}': COM methods must take `&self`", method_name),
            ));
        }
    }

    for arg in sig.inputs.iter().skip(1) {
        if let FnArg::Typed(pat_type) = arg {
            if !matches!(pat_type.pat.as_ref(), Pat::Ident(_)) {
                return Err(syn::Error::new(
                    pat_type.pat.span(),
                    format!("method '{}': parameters must be plain identifiers", method_name),
                ));
            }
            check_ffi_safe_type(&pat_type.ty).map_err(|msg| {
                syn::Error::new(pat_type.ty.span(), format!("method '{}': {}", method_name, msg))
            })?;
        }
    }

    if let ReturnType::Type(_, ty) = &sig.output {
        check_ffi_safe_type(ty).map_err(|msg| {
            syn::Error::new(ty.span(), format!("method '{}': return type {}", method_name, msg))
        })?;
    }

    Ok(())
}

/// Validate an interface trait definition
fn validate_trait(input: &ItemTrait) -> Result<(), syn::Error> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "COM interfaces cannot be generic",
        ));
    }
    for item in &input.items {
        match item {
            TraitItem::Fn(method) => {
                if method.default.is_some() {
                    return Err(syn::Error::new(
                        method.sig.ident.span(),
                        format!(
                            "method '{}': interface methods cannot have default bodies",
                            method.sig.ident
                        ),
                    ));
                }
                validate_signature(&method.sig)?;
            }
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "COM interfaces may only contain methods",
                ));
            }
        }
    }
    Ok(())
}

/// Validate an implementation block
fn validate_impl(input: &ItemImpl) -> Result<(), syn::Error> {
    if input.trait_.is_some() {
        return Err(syn::Error::new(
            input.span(),
            "#[com_implement] goes on an inherent impl block, not a trait impl",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "#[com_implement] does not support generic structs",
        ));
    }
    for item in &input.items {
        if let ImplItem::Fn(method) = item {
            validate_signature(&method.sig)?;
        }
    }
    Ok(())
}

/// Convert interface name to vtable field name (snake_case with vtable_ prefix)
/// IFoo -> vtable_i_foo
/// IDispatch -> vtable_i_dispatch
/// IPropertyNotifySink -> vtable_i_property_notify_sink
fn interface_to_field_name(interface: &Ident) -> Ident {
    let name = interface.to_string();
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::from("vtable_");

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev_lower = chars[i - 1].is_lowercase();
                let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                if prev_lower || next_lower {
                    result.push('_');
                }
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    format_ident!("{}", result)
}

/// Collect `#[doc]` attributes so they survive on generated wrappers
fn doc_attrs(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .cloned()
        .collect()
}

/// Parameter names and types of a signature, skipping the receiver
fn typed_params(sig: &syn::Signature) -> (Vec<Ident>, Vec<Type>) {
    sig.inputs
        .iter()
        .filter_map(|arg| {
            if let FnArg::Typed(pat_type) = arg
                && let Pat::Ident(pat_ident) = pat_type.pat.as_ref()
            {
                return Some((pat_ident.ident.clone(), pat_type.ty.as_ref().clone()));
            }
            None
        })
        .unzip()
}

// =============================================================================
// GUID parsing
// =============================================================================

/// Parse a GUID string in format "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
/// Returns (data1, data2, data3, data4) tuple
fn parse_guid_string(s: &str) -> Result<(u32, u16, u16, [u8; 8]), String> {
    let s = s.trim().trim_start_matches('{').trim_end_matches('}');
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 5 {
        return Err(format!(
            "Invalid GUID format: expected 'xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx', got '{}'",
            s
        ));
    }
    if parts[0].len() != 8 || parts[1].len() != 4 || parts[2].len() != 4 {
        return Err(format!("Invalid GUID group lengths in '{}'", s));
    }
    if parts[3].len() != 4 || parts[4].len() != 12 {
        return Err(format!("Invalid GUID data4 in '{}'", s));
    }

    let data1 = u32::from_str_radix(parts[0], 16)
        .map_err(|_| format!("Invalid GUID data1: '{}'", parts[0]))?;
    let data2 = u16::from_str_radix(parts[1], 16)
        .map_err(|_| format!("Invalid GUID data2: '{}'", parts[1]))?;
    let data3 = u16::from_str_radix(parts[2], 16)
        .map_err(|_| format!("Invalid GUID data3: '{}'", parts[2]))?;

    let tail = format!("{}{}", parts[3], parts[4]);
    let mut data4 = [0u8; 8];
    for (i, byte) in data4.iter_mut().enumerate() {
        let pair = &tail[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|_| format!("Invalid GUID data4[{}]: '{}'", i, pair))?;
    }

    Ok((data1, data2, data3, data4))
}

// =============================================================================
// #[com_interface]
// =============================================================================

/// Arguments of `#[com_interface("guid")]` / `#[com_interface("guid", internal)]`
struct InterfaceArgs {
    guid: LitStr,
    internal: bool,
}

impl Parse for InterfaceArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let guid: LitStr = input.parse()?;
        let mut internal = false;
        while input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let flag: Ident = input.parse()?;
            match flag.to_string().as_str() {
                "internal" => internal = true,
                other => {
                    return Err(syn::Error::new(
                        flag.span(),
                        format!("unknown com_interface option '{}'", other),
                    ));
                }
            }
        }
        Ok(Self { guid, internal })
    }
}

fn com_interface_internal(args: InterfaceArgs, input: ItemTrait) -> Result<TokenStream2, syn::Error> {
    validate_trait(&input)?;

    let (data1, data2, data3, data4) =
        parse_guid_string(&args.guid.value()).map_err(|e| syn::Error::new(args.guid.span(), e))?;

    let krate = crate_path(args.internal);
    let trait_name = &input.ident;
    let vis = &input.vis;
    let vtable_name = format_ident!("{}VTable", trait_name);
    let iid_name = format_ident!("IID_{}", trait_name.to_string().to_uppercase());
    let trait_docs = doc_attrs(&input.attrs);

    let mut vtable_fields = Vec::new();
    let mut wrapper_methods = Vec::new();

    for item in &input.items {
        let TraitItem::Fn(method) = item else {
            continue;
        };
        let method_name = &method.sig.ident;
        let (param_names, param_types) = typed_params(&method.sig);
        let output = &method.sig.output;
        let docs = doc_attrs(&method.attrs);

        vtable_fields.push(quote! {
            pub #method_name: unsafe extern "system" fn(
                this: *mut ::std::ffi::c_void
                #(, #param_names: #param_types)*
            ) #output
        });

        wrapper_methods.push(quote! {
            #(#docs)*
            ///
            /// # Safety
            /// `self` must be a live interface pointer and every pointer argument must
            /// satisfy the COM contract of this method.
            #[inline]
            pub unsafe fn #method_name(&self #(, #param_names: #param_types)*) #output {
                unsafe {
                    ((*self.vtable).#method_name)(
                        self as *const Self as *mut ::std::ffi::c_void
                        #(, #param_names)*
                    )
                }
            }
        });
    }

    let own_slot_count = vtable_fields.len();
    let d4 = data4.iter();

    Ok(quote! {
        /// COM Interface ID (GUID) for this interface
        #vis const #iid_name: #krate::GUID = #krate::GUID::new(
            #data1,
            #data2,
            #data3,
            [#(#d4),*],
        );

        /// VTable struct for this interface
        #[repr(C)]
        #vis struct #vtable_name {
            /// Inherited IUnknown vtable
            pub base: #krate::IUnknownVTable,
            #(#vtable_fields),*
        }

        #(#trait_docs)*
        #[repr(C)]
        #vis struct #trait_name {
            vtable: *const #vtable_name,
        }

        impl #trait_name {
            /// Get the interface ID (GUID) for this COM interface
            #[inline]
            #[must_use]
            pub const fn iid() -> &'static #krate::GUID {
                &#iid_name
            }

            /// Reinterpret a raw interface pointer.
            ///
            /// # Safety
            /// `ptr` must be a live pointer to an object exposing this interface.
            #[inline]
            pub unsafe fn from_ptr<'a>(ptr: *mut ::std::ffi::c_void) -> &'a Self {
                unsafe { &*(ptr as *const Self) }
            }

            /// Access the vtable of this interface pointer
            #[inline]
            pub fn vtable(&self) -> &#vtable_name {
                unsafe { &*self.vtable }
            }

            /// Query for another interface by GUID (forwarded to base IUnknown)
            ///
            /// # Safety
            /// - `riid` must point to a valid GUID
            /// - `ppv` must point to a valid pointer location
            #[inline]
            pub unsafe fn query_interface(
                &self,
                riid: *const #krate::GUID,
                ppv: *mut *mut ::std::ffi::c_void,
            ) -> #krate::HRESULT {
                unsafe {
                    ((*self.vtable).base.query_interface)(
                        self as *const Self as *mut ::std::ffi::c_void,
                        riid,
                        ppv,
                    )
                }
            }

            /// Increment reference count (forwarded to base IUnknown)
            ///
            /// # Safety
            /// `self` must be a live interface pointer.
            #[inline]
            pub unsafe fn add_ref(&self) -> u32 {
                unsafe { ((*self.vtable).base.add_ref)(self as *const Self as *mut ::std::ffi::c_void) }
            }

            /// Decrement reference count (forwarded to base IUnknown)
            ///
            /// # Safety
            /// `self` must be a live interface pointer holding a reference owned by the caller.
            #[inline]
            pub unsafe fn release(&self) -> u32 {
                unsafe { ((*self.vtable).base.release)(self as *const Self as *mut ::std::ffi::c_void) }
            }

            #(#wrapper_methods)*
        }

        unsafe impl #krate::ComInterface for #trait_name {
            const IID: #krate::GUID = #iid_name;
        }

        impl #krate::VTableLayout for #trait_name {
            const SLOT_COUNT: usize =
                <#krate::IUnknown as #krate::VTableLayout>::SLOT_COUNT + #own_slot_count;
            type VTable = #vtable_name;
        }
    })
}

/// Define a COM interface.
///
/// This generates:
/// - An IID constant `IID_{NAME}` parsed from the GUID string
/// - A vtable struct `{Name}VTable` with IUnknown methods (slots 0-2) + your methods
/// - An interface struct `{Name}` with `unsafe` call wrappers
/// - `ComInterface` and `VTableLayout` impls
///
/// Pass `internal` as a second argument when used inside the axcom crate.
///
/// # Example
/// ```ignore
/// #[com_interface("12345678-1234-1234-1234-123456789abc")]
/// pub trait ICalculator {
///     fn add(&self, a: i32, b: i32, result: *mut i32) -> HRESULT;
/// }
/// ```
#[proc_macro_attribute]
pub fn com_interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as InterfaceArgs);
    let input = parse_macro_input!(item as ItemTrait);
    match com_interface_internal(args, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

// =============================================================================
// #[com_implement]
// =============================================================================

fn com_implement_internal(interface_name: Ident, input: ItemImpl) -> Result<TokenStream2, syn::Error> {
    validate_impl(&input)?;

    let krate = crate_path(false);
    let struct_type = &input.self_ty;
    let struct_name = match struct_type.as_ref() {
        Type::Path(type_path) => match type_path.path.segments.last() {
            Some(segment) => segment.ident.clone(),
            None => return Err(syn::Error::new(struct_type.span(), "Expected a type path")),
        },
        _ => return Err(syn::Error::new(struct_type.span(), "Expected a type path")),
    };

    let vtable_name = format_ident!("{}VTable", interface_name);
    let vtable_field = interface_to_field_name(&interface_name);

    // This-adjustment: subtract the offset to get from interface pointer to struct start
    let this_adjust = quote! {
        let offset = ::std::mem::offset_of!(#struct_type, #vtable_field);
        let adjusted = (this as *mut u8).sub(offset) as *mut #struct_type;
    };

    let qi_name = format_ident!("__{}__{}__query_interface", struct_name, interface_name);
    let add_ref_name = format_ident!("__{}__{}__add_ref", struct_name, interface_name);
    let release_name = format_ident!("__{}__{}__release", struct_name, interface_name);

    let mut wrapper_fns = vec![quote! {
        #[allow(non_snake_case)]
        unsafe extern "system" fn #qi_name(
            this: *mut ::std::ffi::c_void,
            riid: *const #krate::GUID,
            ppv: *mut *mut ::std::ffi::c_void,
        ) -> #krate::HRESULT {
            unsafe {
                #this_adjust
                #krate::com_query_interface::<#struct_type>(adjusted, riid, ppv)
            }
        }

        #[allow(non_snake_case)]
        unsafe extern "system" fn #add_ref_name(this: *mut ::std::ffi::c_void) -> u32 {
            unsafe {
                #this_adjust
                #krate::com_add_ref::<#struct_type>(adjusted)
            }
        }

        #[allow(non_snake_case)]
        unsafe extern "system" fn #release_name(this: *mut ::std::ffi::c_void) -> u32 {
            unsafe {
                #this_adjust
                #krate::com_release::<#struct_type>(adjusted)
            }
        }
    }];

    let mut vtable_entries = Vec::new();
    let mut original_methods = Vec::new();

    for item in &input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let method_name = &method.sig.ident;
        // Include interface name in wrapper to avoid conflicts across interfaces
        let wrapper_name = format_ident!("__{}__{}__{}", struct_name, interface_name, method_name);
        let (param_names, param_types) = typed_params(&method.sig);
        let output = &method.sig.output;

        wrapper_fns.push(quote! {
            #[allow(non_snake_case)]
            unsafe extern "system" fn #wrapper_name(
                this: *mut ::std::ffi::c_void
                #(, #param_names: #param_types)*
            ) #output {
                unsafe {
                    #this_adjust
                    let obj = &*adjusted;
                    obj.#method_name(#(#param_names),*)
                }
            }
        });

        vtable_entries.push(quote! {
            #method_name: #wrapper_name
        });

        original_methods.push(method.clone());
    }

    let vtable_static_name = format_ident!(
        "__{}_{}_VTABLE",
        struct_name.to_string().to_uppercase(),
        interface_name.to_string().to_uppercase()
    );
    let vtable_const_name = format_ident!("{}", vtable_field.to_string().to_uppercase());

    Ok(quote! {
        #(#wrapper_fns)*

        static #vtable_static_name: #vtable_name = #vtable_name {
            base: #krate::IUnknownVTable {
                query_interface: #qi_name,
                add_ref: #add_ref_name,
                release: #release_name,
            },
            #(#vtable_entries),*
        };

        impl #struct_type {
            /// Pointer to the vtable for this interface implementation.
            /// Use this when constructing the struct.
            pub const #vtable_const_name: *const #vtable_name = &#vtable_static_name;

            #(#original_methods)*
        }
    })
}

/// Implement a COM interface for a struct.
///
/// This generates:
/// - Static vtable instance whose IUnknown slots forward to `axcom::ComObject`
/// - Wrapper functions that adjust `this` and call your methods
/// - A vtable accessor constant (`VTABLE_I_INTERFACE_NAME`)
///
/// # Requirements
///
/// Your struct must:
/// - be `#[repr(C)]`
/// - have a vtable pointer field named `vtable_i_{interface_name}`
/// - implement `axcom::ComObject` and be heap-allocated through `axcom::ComBox`
///
/// # Example
/// ```ignore
/// #[repr(C)]
/// struct Calculator {
///     vtable_i_calculator: *const ICalculatorVTable,
///     ref_count: ComRefCount,
/// }
///
/// #[com_implement(ICalculator)]
/// impl Calculator {
///     fn add(&self, a: i32, b: i32, result: *mut i32) -> HRESULT {
///         unsafe { *result = a + b };
///         S_OK
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn com_implement(attr: TokenStream, item: TokenStream) -> TokenStream {
    let interface_name = parse_macro_input!(attr as Ident);
    let input = parse_macro_input!(item as ItemImpl);
    match com_implement_internal(interface_name, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
