//! C type representation.
//!
//! Types are plain values: deriving a pointer or array type produces a new
//! `CType` and never touches the definition it was derived from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A C type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CType {
    /// void type
    Void,

    /// Integer type (char, short, int, long long and their unsigned forms)
    Int(IntType),

    /// Floating-point type
    Float(FloatType),

    /// Pointer to another type
    Pointer(Box<CType>),

    /// Array of elements
    Array(ArrayType),

    /// Structure type
    Struct(StructType),

    /// Union type
    Union(UnionType),

    /// Enumeration type
    Enum(EnumType),

    /// Function type (only ever seen behind a pointer)
    Function(FunctionType),

    /// Typedef carrying its target inline
    Typedef(TypedefType),

    /// Named reference resolved through a type database
    Named(String),
}

impl CType {
    /// Size of this type in bytes, assuming 8-byte pointers.
    ///
    /// Returns None for incomplete types and for named references, which
    /// need a database to resolve (see `TypeDatabase::size_of`).
    pub fn size(&self) -> Option<usize> {
        match self {
            CType::Void => None,
            CType::Int(i) => Some(i.size),
            CType::Float(f) => Some(f.size),
            CType::Pointer(_) => Some(8),
            CType::Array(a) => Some(a.element.size()? * a.length?),
            CType::Struct(s) => Some(s.size),
            CType::Union(u) => Some(u.size),
            CType::Enum(e) => Some(e.underlying_size),
            CType::Function(_) => None,
            CType::Typedef(t) => t.target.size(),
            CType::Named(_) => None,
        }
    }

    /// Alignment of this type in bytes.
    pub fn alignment(&self) -> Option<usize> {
        match self {
            CType::Void => None,
            CType::Int(i) => Some(i.size.min(8)),
            CType::Float(f) => Some(f.size.min(8)),
            CType::Pointer(_) => Some(8),
            CType::Array(a) => a.element.alignment(),
            CType::Struct(s) => Some(s.alignment),
            CType::Union(u) => Some(u.alignment),
            CType::Enum(e) => Some(e.underlying_size.min(8)),
            CType::Function(_) => None,
            CType::Typedef(t) => t.target.alignment(),
            CType::Named(_) => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, CType::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CType::Float(_))
    }

    /// Check if this is a pointer type (typedefs are not looked through).
    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    /// Check if this is an array type (typedefs are not looked through).
    pub fn is_array(&self) -> bool {
        matches!(self, CType::Array(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, CType::Struct(_))
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Element type and length of an array type.
    pub fn array_parts(&self) -> Option<(&CType, Option<usize>)> {
        match self {
            CType::Array(a) => Some((&a.element, a.length)),
            _ => None,
        }
    }

    /// Wrap this type in `depth` levels of pointer indirection.
    pub fn with_pointer_depth(self, depth: u32) -> CType {
        (0..depth).fold(self, |ty, _| CType::ptr(ty))
    }

    /// The name a type goes by, if it has one.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            CType::Struct(s) => s.name.as_deref(),
            CType::Union(u) => u.name.as_deref(),
            CType::Enum(e) => e.name.as_deref(),
            CType::Typedef(t) => Some(&t.name),
            CType::Named(n) => Some(n),
            _ => None,
        }
    }

    /// Format this type as a C declaration.
    pub fn to_c_string(&self, name: Option<&str>) -> String {
        let suffix = name.map(|n| format!(" {}", n)).unwrap_or_default();
        match self {
            CType::Void => format!("void{}", suffix),
            CType::Int(i) => {
                let type_name = match (i.signed, i.size) {
                    (true, 1) => "char",
                    (false, 1) => "unsigned char",
                    (true, 2) => "short",
                    (false, 2) => "unsigned short",
                    (true, 4) => "int",
                    (false, 4) => "unsigned int",
                    (true, 8) => "long long",
                    (false, 8) => "unsigned long long",
                    _ => "int",
                };
                format!("{}{}", type_name, suffix)
            }
            CType::Float(f) => {
                let type_name = match f.size {
                    4 => "float",
                    16 => "long double",
                    _ => "double",
                };
                format!("{}{}", type_name, suffix)
            }
            CType::Pointer(inner) => format!("{}*{}", inner.to_c_string(None), suffix),
            CType::Array(a) => {
                let elem_str = a.element.to_c_string(name);
                match a.length {
                    Some(len) => format!("{}[{}]", elem_str, len),
                    None => format!("{}[]", elem_str),
                }
            }
            CType::Struct(s) => tagged("struct", s.name.as_deref(), name),
            CType::Union(u) => tagged("union", u.name.as_deref(), name),
            CType::Enum(e) => tagged("enum", e.name.as_deref(), name),
            CType::Function(f) => {
                let params: Vec<_> = f
                    .parameters
                    .iter()
                    .map(|p| p.param_type.to_c_string(Some(&p.name)))
                    .collect();
                let params_str = if params.is_empty() {
                    "void".to_string()
                } else {
                    params.join(", ")
                };
                format!(
                    "{} {}({})",
                    f.return_type.to_c_string(None),
                    name.unwrap_or(""),
                    params_str
                )
            }
            CType::Typedef(t) => format!("{}{}", t.name, suffix),
            CType::Named(n) => format!("{}{}", n, suffix),
        }
    }
}

fn tagged(keyword: &str, tag: Option<&str>, name: Option<&str>) -> String {
    let mut out = match tag {
        Some(tag) => format!("{} {}", keyword, tag),
        None => keyword.to_string(),
    };
    if let Some(name) = name {
        out.push(' ');
        out.push_str(name);
    }
    out
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_c_string(None))
    }
}

/// Integer type details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntType {
    /// Size in bytes.
    pub size: usize,
    /// Whether the type is signed.
    pub signed: bool,
}

impl IntType {
    pub fn new(size: usize, signed: bool) -> Self {
        Self { size, signed }
    }
}

/// Floating-point type details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatType {
    /// Size in bytes.
    pub size: usize,
}

/// Array type details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayType {
    /// Element type.
    pub element: Box<CType>,
    /// Array length (None for incomplete arrays).
    pub length: Option<usize>,
}

impl ArrayType {
    pub fn new(element: CType, length: Option<usize>) -> Self {
        Self {
            element: Box::new(element),
            length,
        }
    }
}

/// Structure type details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    /// Optional struct tag name.
    pub name: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<StructField>,
    /// Total size in bytes (including padding).
    pub size: usize,
    /// Alignment requirement.
    pub alignment: usize,
    /// Whether this is a packed struct.
    pub packed: bool,
}

impl StructType {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            fields: Vec::new(),
            size: 0,
            alignment: 1,
            packed: false,
        }
    }

    /// Add a field using the type's own size and alignment.
    pub fn add_field(&mut self, name: impl Into<String>, field_type: CType) {
        let size = field_type.size().unwrap_or(0);
        let align = field_type.alignment().unwrap_or(1);
        self.add_sized_field(name, field_type, size, align);
    }

    /// Add a field with an externally computed size and alignment.
    ///
    /// Used when the field type is a named reference whose size only a
    /// type database knows.
    pub fn add_sized_field(
        &mut self,
        name: impl Into<String>,
        field_type: CType,
        size: usize,
        align: usize,
    ) {
        let align = align.max(1);
        let offset = if self.packed {
            self.size
        } else {
            (self.size + align - 1) & !(align - 1)
        };

        self.fields.push(StructField {
            name: name.into(),
            field_type,
            offset_bits: (offset as u64) * 8,
        });

        self.size = offset + size;
        self.alignment = self.alignment.max(align);
    }

    /// Place a field at an explicit bit offset (debug-info style layouts).
    pub fn add_field_at_bits(&mut self, name: impl Into<String>, field_type: CType, offset_bits: u64) {
        let end = (offset_bits as usize).div_ceil(8) + field_type.size().unwrap_or(0);
        self.fields.push(StructField {
            name: name.into(),
            field_type,
            offset_bits,
        });
        self.size = self.size.max(end);
    }

    /// Finalize the struct (add trailing padding).
    pub fn finalize(&mut self) {
        if !self.packed && self.alignment > 1 {
            self.size = (self.size + self.alignment - 1) & !(self.alignment - 1);
        }
    }

    /// Get field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A field in a struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub field_type: CType,
    /// Offset from the start of the struct, in bits.
    pub offset_bits: u64,
}

impl StructField {
    /// Offset in bytes (bit offset shifted down by 3).
    pub fn byte_offset(&self) -> usize {
        (self.offset_bits >> 3) as usize
    }
}

/// Union type details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionType {
    /// Optional union tag name.
    pub name: Option<String>,
    /// Members.
    pub members: Vec<UnionMember>,
    /// Total size (max of all members).
    pub size: usize,
    /// Alignment requirement.
    pub alignment: usize,
}

impl UnionType {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            members: Vec::new(),
            size: 0,
            alignment: 1,
        }
    }

    pub fn add_member(&mut self, name: impl Into<String>, member_type: CType) {
        let member_size = member_type.size().unwrap_or(0);
        let member_align = member_type.alignment().unwrap_or(1);

        self.members.push(UnionMember {
            name: name.into(),
            member_type,
        });

        self.size = self.size.max(member_size);
        self.alignment = self.alignment.max(member_align);
    }
}

/// A member in a union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionMember {
    pub name: String,
    pub member_type: CType,
}

/// Enumeration type details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    /// Optional enum tag name.
    pub name: Option<String>,
    /// Enumerators (name, value).
    pub values: Vec<(String, i64)>,
    /// Size of underlying integer type.
    pub underlying_size: usize,
}

impl EnumType {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            values: Vec::new(),
            underlying_size: 4,
        }
    }

    pub fn add_value(&mut self, name: impl Into<String>, value: i64) {
        self.values.push((name.into(), value));
        if value > i32::MAX as i64 || value < i32::MIN as i64 {
            self.underlying_size = 8;
        }
    }
}

/// Function type details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    /// Return type.
    pub return_type: Box<CType>,
    /// Parameters.
    pub parameters: Vec<FunctionParam>,
}

impl FunctionType {
    pub fn new(return_type: CType) -> Self {
        Self {
            return_type: Box::new(return_type),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, param_type: CType) -> Self {
        self.parameters.push(FunctionParam {
            name: name.into(),
            param_type,
        });
        self
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub name: String,
    pub param_type: CType,
}

/// Typedef details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedefType {
    /// Typedef name.
    pub name: String,
    /// Target type.
    pub target: Box<CType>,
}

impl TypedefType {
    pub fn new(name: impl Into<String>, target: CType) -> Self {
        Self {
            name: name.into(),
            target: Box::new(target),
        }
    }
}

// Common type constructors
impl CType {
    pub fn void() -> Self {
        CType::Void
    }
    pub fn char() -> Self {
        CType::Int(IntType::new(1, true))
    }
    pub fn uchar() -> Self {
        CType::Int(IntType::new(1, false))
    }
    pub fn short() -> Self {
        CType::Int(IntType::new(2, true))
    }
    pub fn ushort() -> Self {
        CType::Int(IntType::new(2, false))
    }
    pub fn int() -> Self {
        CType::Int(IntType::new(4, true))
    }
    pub fn uint() -> Self {
        CType::Int(IntType::new(4, false))
    }
    pub fn longlong() -> Self {
        CType::Int(IntType::new(8, true))
    }
    pub fn ulonglong() -> Self {
        CType::Int(IntType::new(8, false))
    }
    pub fn double() -> Self {
        CType::Float(FloatType { size: 8 })
    }

    pub fn ptr(inner: CType) -> Self {
        CType::Pointer(Box::new(inner))
    }
    pub fn array(element: CType, length: Option<usize>) -> Self {
        CType::Array(ArrayType::new(element, length))
    }
    pub fn named(name: impl Into<String>) -> Self {
        CType::Named(name.into())
    }
    pub fn typedef(name: impl Into<String>, target: CType) -> Self {
        CType::Typedef(TypedefType::new(name, target))
    }
}
