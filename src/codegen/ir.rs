//! Source intermediate representation
//!
//! A shallow, language-agnostic description of one generated file. Imports,
//! types and function signatures are modelled precisely; function bodies are
//! opaque statement lines produced by each emitter.
//!
//! Values are assembled with consuming builders (`with_*`), so a fragment
//! shared between emitters is cloned rather than mutated in place.

/// One generated source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File stem; the emitter adds its extension
    pub name: String,
    /// In declaration order, without duplicates
    pub imports: Vec<String>,
    pub structs: Vec<Struct>,
    pub functions: Vec<Function>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Vec::new(),
            structs: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Add an import unless it is already declared
    pub fn with_import(mut self, import: impl Into<String>) -> Self {
        let import = import.into();
        if !self.imports.contains(&import) {
            self.imports.push(import);
        }
        self
    }

    pub fn with_imports<I, S>(self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        imports
            .into_iter()
            .fold(self, |file, import| file.with_import(import))
    }

    pub fn with_struct(mut self, declaration: Struct) -> Self {
        self.structs.push(declaration);
        self
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_functions(mut self, functions: impl IntoIterator<Item = Function>) -> Self {
        self.functions.extend(functions);
        self
    }

    /// Every type name referenced by a field, parameter or return slot
    pub fn referenced_types(&self) -> impl Iterator<Item = &str> {
        let fields = self
            .structs
            .iter()
            .flat_map(|s| s.fields.iter().map(|f| f.type_name.as_str()));
        let params = self
            .functions
            .iter()
            .flat_map(|f| f.params.iter().map(|p| p.type_name.as_str()));
        let returns = self
            .functions
            .iter()
            .flat_map(|f| f.returns.iter().map(|r| r.type_name.as_str()));
        fields.chain(params).chain(returns)
    }
}

/// Record type (Go struct, Python dataclass)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Struct {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Struct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    /// Rendered as a pointer / `Optional`
    pub optional: bool,
    /// Serialization key (Go `json` tag)
    pub key: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            optional: false,
            key: None,
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<Return>,
    /// Pre-rendered statements, one per line, without base indentation
    pub body: Vec<String>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_return(mut self, type_name: impl Into<String>) -> Self {
        self.returns.push(Return {
            type_name: type_name.into(),
        });
        self
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.body.push(line.into());
        self
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.extend(lines.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
    /// Default value expression, for languages that have them
    pub default: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Return {
    pub type_name: String,
}
