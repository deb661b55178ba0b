//! In-memory type library description
//!
//! A [`LibraryModel`] is the Rust-side source of truth that the `ITypeLib` /
//! `ITypeInfo` objects in [`crate::typelib`] expose through the COM ABI.
//! Build one with [`TypeLibBuilder`]:
//!
//! ```ignore
//! let lib = TypeLibBuilder::new("CalcLib", CALCLIB_GUID)
//!     .dispinterface("ICalc", ICALC_IID, |i| {
//!         i.property(1, "Name", TypeSpec::Bstr)
//!             .method(2, "Add", |f| f.param("x", TypeSpec::I4).param("y", TypeSpec::I4).returns(TypeSpec::I4))
//!     })
//!     .coclass("Calculator", CALC_CLSID, |c| c.default_interface("ICalc"))
//!     .build();
//! ```
//!
//! References between types are by name. A name that is neither declared in
//! the library nor one of the standard OLE types (see [`LibraryModel::stdole`])
//! produces a dangling reference, which is useful to exercise clients against
//! malformed libraries.

use std::rc::Rc;

use axcom::*;

/// Type of a parameter, return value, variable or alias
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Void,
    Bool,
    I1,
    I2,
    I4,
    Int,
    I8,
    UI1,
    UI2,
    UI4,
    UInt,
    UI8,
    Cy,
    R4,
    R8,
    Bstr,
    Date,
    Variant,
    Dispatch,
    Unknown,
    Hresult,
    Error,
    Decimal,
    Ptr(Box<TypeSpec>),
    SafeArray(Box<TypeSpec>),
    CArray(Box<TypeSpec>, u32),
    /// Reference to a named type in this library or in stdole
    User(String),
}

impl TypeSpec {
    pub fn ptr(inner: TypeSpec) -> Self {
        TypeSpec::Ptr(Box::new(inner))
    }

    pub fn safe_array(element: TypeSpec) -> Self {
        TypeSpec::SafeArray(Box::new(element))
    }

    pub fn user(name: &str) -> Self {
        TypeSpec::User(name.to_string())
    }

    /// The `VARTYPE` of the outermost level
    #[must_use]
    pub fn vt(&self) -> VARTYPE {
        match self {
            TypeSpec::Void => VT_VOID,
            TypeSpec::Bool => VT_BOOL,
            TypeSpec::I1 => VT_I1,
            TypeSpec::I2 => VT_I2,
            TypeSpec::I4 => VT_I4,
            TypeSpec::Int => VT_INT,
            TypeSpec::I8 => VT_I8,
            TypeSpec::UI1 => VT_UI1,
            TypeSpec::UI2 => VT_UI2,
            TypeSpec::UI4 => VT_UI4,
            TypeSpec::UInt => VT_UINT,
            TypeSpec::UI8 => VT_UI8,
            TypeSpec::Cy => VT_CY,
            TypeSpec::R4 => VT_R4,
            TypeSpec::R8 => VT_R8,
            TypeSpec::Bstr => VT_BSTR,
            TypeSpec::Date => VT_DATE,
            TypeSpec::Variant => VT_VARIANT,
            TypeSpec::Dispatch => VT_DISPATCH,
            TypeSpec::Unknown => VT_UNKNOWN,
            TypeSpec::Hresult => VT_HRESULT,
            TypeSpec::Error => VT_ERROR,
            TypeSpec::Decimal => VT_DECIMAL,
            TypeSpec::Ptr(_) => VT_PTR,
            TypeSpec::SafeArray(_) => VT_SAFEARRAY,
            TypeSpec::CArray(..) => VT_CARRAY,
            TypeSpec::User(_) => VT_USERDEFINED,
        }
    }
}

/// One parameter of a function
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Empty names are not reported by `GetNames` (property-put values)
    pub name: String,
    pub ty: TypeSpec,
    pub flags: u16,
}

impl ParamSpec {
    pub fn new(name: &str, ty: TypeSpec) -> Self {
        Self {
            name: name.to_string(),
            ty,
            flags: PARAMFLAG_FIN,
        }
    }
}

/// One function of a dispinterface
#[derive(Debug, Clone, PartialEq)]
pub struct FuncSpec {
    pub memid: MEMBERID,
    pub name: String,
    pub invkind: INVOKEKIND,
    pub funckind: FUNCKIND,
    pub params: Vec<ParamSpec>,
    pub ret: TypeSpec,
    pub flags: u16,
}

impl FuncSpec {
    pub fn new(memid: MEMBERID, name: &str, invkind: INVOKEKIND) -> Self {
        Self {
            memid,
            name: name.to_string(),
            invkind,
            funckind: FUNC_DISPATCH,
            params: Vec::new(),
            ret: TypeSpec::Void,
            flags: 0,
        }
    }

    /// Add an `[in]` parameter.
    pub fn param(mut self, name: &str, ty: TypeSpec) -> Self {
        self.params.push(ParamSpec::new(name, ty));
        self
    }

    /// Add an `[in, optional]` parameter.
    pub fn optional(mut self, name: &str, ty: TypeSpec) -> Self {
        let mut param = ParamSpec::new(name, ty);
        param.flags |= PARAMFLAG_FOPT;
        self.params.push(param);
        self
    }

    /// Add an `[out]` parameter; `ty` is wrapped in a pointer.
    pub fn out(mut self, name: &str, ty: TypeSpec) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty: TypeSpec::ptr(ty),
            flags: PARAMFLAG_FOUT,
        });
        self
    }

    /// Add an `[in, out]` parameter; `ty` is wrapped in a pointer.
    pub fn in_out(mut self, name: &str, ty: TypeSpec) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty: TypeSpec::ptr(ty),
            flags: PARAMFLAG_FIN | PARAMFLAG_FOUT,
        });
        self
    }

    pub fn returns(mut self, ty: TypeSpec) -> Self {
        self.ret = ty;
        self
    }

    /// Return through an `[out, retval]` pointer parameter instead of the function type.
    pub fn retval(mut self, ty: TypeSpec) -> Self {
        self.params.push(ParamSpec {
            name: "retval".to_string(),
            ty: TypeSpec::ptr(ty),
            flags: PARAMFLAG_FOUT | PARAMFLAG_FRETVAL,
        });
        self.ret = TypeSpec::Hresult;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self
    }

    pub fn funckind(mut self, funckind: FUNCKIND) -> Self {
        self.funckind = funckind;
        self
    }

    /// Parameters that are not the return value
    pub fn visible_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params
            .iter()
            .filter(|p| p.flags & PARAMFLAG_FRETVAL == 0)
    }

    /// Number of trailing optional parameters
    #[must_use]
    pub fn optional_count(&self) -> usize {
        self.params
            .iter()
            .rev()
            .take_while(|p| p.flags & PARAMFLAG_FOPT != 0)
            .count()
    }
}

/// One variable of a dispinterface or one constant of an enum
#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    pub memid: MEMBERID,
    /// `None` makes `GetNames` fail for this member
    pub name: Option<String>,
    pub ty: TypeSpec,
    pub flags: u16,
    pub varkind: VARKIND,
    pub value: Option<i32>,
}

/// Kind-specific content of a type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeBody {
    Enum,
    Dispatch,
    Interface,
    Record,
    CoClass,
    Alias(TypeSpec),
}

impl TypeBody {
    #[must_use]
    pub fn typekind(&self) -> TYPEKIND {
        match self {
            TypeBody::Enum => TKIND_ENUM,
            TypeBody::Dispatch => TKIND_DISPATCH,
            TypeBody::Interface => TKIND_INTERFACE,
            TypeBody::Record => TKIND_RECORD,
            TypeBody::CoClass => TKIND_COCLASS,
            TypeBody::Alias(_) => TKIND_ALIAS,
        }
    }
}

/// One type of a library
#[derive(Debug, Clone, PartialEq)]
pub struct TypeModel {
    /// `None` makes `ITypeLib::GetDocumentation` fail for this type
    pub name: Option<String>,
    pub guid: GUID,
    pub body: TypeBody,
    pub doc: String,
    pub flags: u16,
    pub version: (u16, u16),
    pub funcs: Vec<FuncSpec>,
    pub vars: Vec<VarSpec>,
    /// Implemented or inherited types by name, with `IMPLTYPEFLAG_*`
    pub impl_types: Vec<(String, i32)>,
}

impl TypeModel {
    fn new(name: Option<&str>, guid: GUID, body: TypeBody) -> Self {
        Self {
            name: name.map(str::to_string),
            guid,
            body,
            doc: String::new(),
            flags: 0,
            version: (0, 0),
            funcs: Vec::new(),
            vars: Vec::new(),
            impl_types: Vec::new(),
        }
    }

    #[must_use]
    pub fn typekind(&self) -> TYPEKIND {
        self.body.typekind()
    }

    #[must_use]
    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// A complete type library
#[derive(Debug, PartialEq)]
pub struct LibraryModel {
    pub name: String,
    pub guid: GUID,
    pub doc: String,
    pub version: (u16, u16),
    pub types: Vec<TypeModel>,
    /// Standard OLE types referenced by name; `None` for stdole itself
    pub stdole: Option<Rc<LibraryModel>>,
}

/// Library ID of the standard OLE type library
pub const LIBID_STDOLE: GUID = GUID::new(
    0x00020430,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

/// Set on an `HREFTYPE` that points into stdole
pub const HREF_STDOLE: HREFTYPE = 0x8000_0000;
/// An `HREFTYPE` that resolves to nothing
pub const HREF_INVALID: HREFTYPE = 0xFFFF_FFFF;

impl LibraryModel {
    /// The subset of `stdole2.tlb` the bridge understands: IUnknown,
    /// IDispatch, `OLE_COLOR`, the font and picture dispinterfaces.
    #[must_use]
    pub fn stdole() -> Rc<LibraryModel> {
        let mut unknown = TypeModel::new(Some("IUnknown"), IID_IUNKNOWN, TypeBody::Interface);
        unknown.funcs = vec![
            FuncSpec::new(0x6000_0000, "QueryInterface", INVOKE_FUNC)
                .param("riid", TypeSpec::ptr(TypeSpec::user("GUID")))
                .out("ppvObj", TypeSpec::ptr(TypeSpec::Void))
                .funckind(FUNC_PUREVIRTUAL),
            FuncSpec::new(0x6000_0001, "AddRef", INVOKE_FUNC)
                .returns(TypeSpec::UI4)
                .funckind(FUNC_PUREVIRTUAL),
            FuncSpec::new(0x6000_0002, "Release", INVOKE_FUNC)
                .returns(TypeSpec::UI4)
                .funckind(FUNC_PUREVIRTUAL),
        ];

        let mut dispatch = TypeModel::new(Some("IDispatch"), IID_IDISPATCH, TypeBody::Interface);
        dispatch.impl_types = vec![("IUnknown".to_string(), 0)];

        let color = TypeModel::new(Some("OLE_COLOR"), GUID::ZERO, TypeBody::Alias(TypeSpec::UI4));

        let mut font = TypeModel::new(Some("IFontDisp"), IID_IFONTDISP, TypeBody::Dispatch);
        font.impl_types = vec![("IDispatch".to_string(), 0)];

        let mut picture = TypeModel::new(Some("Picture"), IID_IPICTUREDISP, TypeBody::Dispatch);
        picture.impl_types = vec![("IDispatch".to_string(), 0)];

        Rc::new(LibraryModel {
            name: "stdole".to_string(),
            guid: LIBID_STDOLE,
            doc: "OLE Automation".to_string(),
            version: (2, 0),
            types: vec![unknown, dispatch, color, font, picture],
            stdole: None,
        })
    }

    /// Index of the type called `name` in this library
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.types
            .iter()
            .position(|t| t.name.as_deref() == Some(name))
    }

    /// Index of the type with `guid` in this library
    #[must_use]
    pub fn find_guid(&self, guid: &GUID) -> Option<usize> {
        if guid.is_zero() {
            return None;
        }
        self.types.iter().position(|t| t.guid == *guid)
    }

    /// Reference handle for the type called `name`
    #[must_use]
    pub fn href_of(&self, name: &str) -> HREFTYPE {
        if let Some(index) = self.find(name) {
            return index as HREFTYPE;
        }
        match &self.stdole {
            Some(stdole) => stdole
                .find(name)
                .map_or(HREF_INVALID, |index| HREF_STDOLE | index as HREFTYPE),
            None => HREF_INVALID,
        }
    }

    /// Library and index a reference handle points at
    #[must_use]
    pub fn resolve(self: &Rc<Self>, href: HREFTYPE) -> Option<(Rc<LibraryModel>, usize)> {
        if href == HREF_INVALID {
            return None;
        }
        if href & HREF_STDOLE != 0 {
            let stdole = self.stdole.as_ref()?;
            let index = (href & !HREF_STDOLE) as usize;
            return (index < stdole.types.len()).then(|| (stdole.clone(), index));
        }
        let index = href as usize;
        (index < self.types.len()).then(|| (self.clone(), index))
    }

    /// Name of a type, looked up here or in stdole
    #[must_use]
    pub fn type_named(&self, name: &str) -> Option<&TypeModel> {
        self.find(name).map(|i| &self.types[i]).or_else(|| {
            self.stdole
                .as_ref()
                .and_then(|s| s.find(name).map(|i| &s.types[i]))
        })
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Builder for the members of a dispinterface
pub struct InterfaceBuilder {
    model: TypeModel,
}

impl InterfaceBuilder {
    /// Inherit from another dispinterface of the library instead of IDispatch.
    pub fn inherits(mut self, base: &str) -> Self {
        self.model.impl_types = vec![(base.to_string(), 0)];
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.model.doc = doc.to_string();
        self
    }

    /// A read/write property: a getter and a setter function.
    pub fn property(self, memid: MEMBERID, name: &str, ty: TypeSpec) -> Self {
        self.getter(memid, name, ty.clone(), 0).setter(memid, name, ty, 0)
    }

    /// A read-only property.
    pub fn readonly_property(self, memid: MEMBERID, name: &str, ty: TypeSpec) -> Self {
        self.getter(memid, name, ty, 0)
    }

    /// A bindable read/write property that notifies through `IPropertyNotifySink`.
    pub fn bindable_property(self, memid: MEMBERID, name: &str, ty: TypeSpec) -> Self {
        let flags = FUNCFLAG_FBINDABLE | FUNCFLAG_FREQUESTEDIT;
        self.getter(memid, name, ty.clone(), flags).setter(memid, name, ty, flags)
    }

    /// A property-get function.
    pub fn getter(mut self, memid: MEMBERID, name: &str, ty: TypeSpec, flags: u16) -> Self {
        self.model.funcs.push(
            FuncSpec::new(memid, name, INVOKE_PROPERTYGET)
                .returns(ty)
                .flags(flags),
        );
        self
    }

    /// A property-put function taking the new value.
    pub fn setter(mut self, memid: MEMBERID, name: &str, ty: TypeSpec, flags: u16) -> Self {
        self.model.funcs.push(
            FuncSpec::new(memid, name, INVOKE_PROPERTYPUT)
                .param("", ty)
                .flags(flags),
        );
        self
    }

    /// A method; `build` adds parameters and the return type.
    pub fn method(
        mut self,
        memid: MEMBERID,
        name: &str,
        build: impl FnOnce(FuncSpec) -> FuncSpec,
    ) -> Self {
        self.model
            .funcs
            .push(build(FuncSpec::new(memid, name, INVOKE_FUNC)));
        self
    }

    /// Any prepared function.
    pub fn function(mut self, func: FuncSpec) -> Self {
        self.model.funcs.push(func);
        self
    }

    /// A dispatch variable (`VAR_DISPATCH`).
    pub fn variable(mut self, memid: MEMBERID, name: &str, ty: TypeSpec, flags: u16) -> Self {
        self.model.vars.push(VarSpec {
            memid,
            name: Some(name.to_string()),
            ty,
            flags,
            varkind: VAR_DISPATCH,
            value: None,
        });
        self
    }
}

/// Builder for the constants of an enum
pub struct EnumBuilder {
    model: TypeModel,
    next_memid: MEMBERID,
}

impl EnumBuilder {
    pub fn value(self, name: &str, value: i32) -> Self {
        self.push(Some(name), value)
    }

    /// A constant `GetNames` knows no name for.
    pub fn unnamed(self, value: i32) -> Self {
        self.push(None, value)
    }

    fn push(mut self, name: Option<&str>, value: i32) -> Self {
        self.model.vars.push(VarSpec {
            memid: self.next_memid,
            name: name.map(str::to_string),
            ty: TypeSpec::I4,
            flags: 0,
            varkind: VAR_CONST,
            value: Some(value),
        });
        self.next_memid += 1;
        self
    }
}

/// Builder for a coclass
pub struct CoClassBuilder {
    model: TypeModel,
}

impl CoClassBuilder {
    /// The default incoming interface.
    pub fn default_interface(mut self, name: &str) -> Self {
        self.model
            .impl_types
            .push((name.to_string(), IMPLTYPEFLAG_FDEFAULT));
        self
    }

    /// An additional incoming interface.
    pub fn interface(mut self, name: &str) -> Self {
        self.model.impl_types.push((name.to_string(), 0));
        self
    }

    /// An outgoing (event) interface; the first one is the default source.
    pub fn source(mut self, name: &str) -> Self {
        let has_default = self.model.impl_types.iter().any(|(_, flags)| {
            flags & (IMPLTYPEFLAG_FSOURCE | IMPLTYPEFLAG_FDEFAULT)
                == IMPLTYPEFLAG_FSOURCE | IMPLTYPEFLAG_FDEFAULT
        });
        let flags = if has_default {
            IMPLTYPEFLAG_FSOURCE
        } else {
            IMPLTYPEFLAG_FSOURCE | IMPLTYPEFLAG_FDEFAULT
        };
        self.model.impl_types.push((name.to_string(), flags));
        self
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.model.version = (major, minor);
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.model.doc = doc.to_string();
        self
    }
}

/// Builder for a [`LibraryModel`]
pub struct TypeLibBuilder {
    name: String,
    guid: GUID,
    doc: String,
    version: (u16, u16),
    types: Vec<TypeModel>,
}

impl TypeLibBuilder {
    pub fn new(name: &str, guid: GUID) -> Self {
        Self {
            name: name.to_string(),
            guid,
            doc: String::new(),
            version: (1, 0),
            types: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.version = (major, minor);
        self
    }

    /// A dispinterface deriving from IDispatch unless `inherits` says otherwise.
    pub fn dispinterface(
        mut self,
        name: &str,
        iid: GUID,
        build: impl FnOnce(InterfaceBuilder) -> InterfaceBuilder,
    ) -> Self {
        self.types.push(dispinterface_model(name, iid, build));
        self
    }

    pub fn enumeration(
        mut self,
        name: &str,
        build: impl FnOnce(EnumBuilder) -> EnumBuilder,
    ) -> Self {
        let model = self.enum_model(Some(name), build);
        self.types.push(model);
        self
    }

    /// An enum whose name the library does not report.
    pub fn anonymous_enumeration(mut self, build: impl FnOnce(EnumBuilder) -> EnumBuilder) -> Self {
        let model = self.enum_model(None, build);
        self.types.push(model);
        self
    }

    fn enum_model(
        &self,
        name: Option<&str>,
        build: impl FnOnce(EnumBuilder) -> EnumBuilder,
    ) -> TypeModel {
        let model = TypeModel::new(name, GUID::ZERO, TypeBody::Enum);
        build(EnumBuilder {
            model,
            next_memid: 0x4000_0000 + (self.types.len() as MEMBERID) * 0x100,
        })
        .model
    }

    pub fn coclass(
        mut self,
        name: &str,
        clsid: GUID,
        build: impl FnOnce(CoClassBuilder) -> CoClassBuilder,
    ) -> Self {
        let mut model = TypeModel::new(Some(name), clsid, TypeBody::CoClass);
        model.flags = TYPEFLAG_FCANCREATE | TYPEFLAG_FCONTROL;
        self.types.push(build(CoClassBuilder { model }).model);
        self
    }

    pub fn alias(mut self, name: &str, target: TypeSpec) -> Self {
        self.types
            .push(TypeModel::new(Some(name), GUID::ZERO, TypeBody::Alias(target)));
        self
    }

    pub fn record(mut self, name: &str, guid: GUID) -> Self {
        self.types
            .push(TypeModel::new(Some(name), guid, TypeBody::Record));
        self
    }

    /// Any prepared type.
    pub fn raw_type(mut self, model: TypeModel) -> Self {
        self.types.push(model);
        self
    }

    pub fn build(self) -> Rc<LibraryModel> {
        Rc::new(LibraryModel {
            name: self.name,
            guid: self.guid,
            doc: self.doc,
            version: self.version,
            types: self.types,
            stdole: Some(LibraryModel::stdole()),
        })
    }
}

/// Prepare a standalone dispinterface model, e.g. to feed [`TypeLibBuilder::raw_type`].
pub fn dispinterface_model(
    name: &str,
    iid: GUID,
    build: impl FnOnce(InterfaceBuilder) -> InterfaceBuilder,
) -> TypeModel {
    let mut model = TypeModel::new(Some(name), iid, TypeBody::Dispatch);
    model.flags = TYPEFLAG_FDISPATCHABLE;
    model.impl_types = vec![("IDispatch".to_string(), 0)];
    build(InterfaceBuilder { model }).model
}
