//! Assembles class-file bytes for tests, so fixtures do not depend on a Java
//! compiler being installed.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum Element {
    Str(String),
    Int(i32),
    Long(i64),
    Enum(String, String),
    Class(String),
    Nested(Annotation),
    Array(Vec<Element>),
}

#[derive(Debug, Clone)]
pub struct Annotation {
    descriptor: String,
    visible: bool,
    elements: Vec<(String, Element)>,
}

impl Annotation {
    pub fn new(type_name: &str) -> Self {
        Self {
            descriptor: descriptor(type_name),
            visible: true,
            elements: Vec::new(),
        }
    }

    pub fn invisible(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with(mut self, name: &str, value: Element) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }
}

#[derive(Debug, Clone)]
struct Member {
    name: String,
    descriptor: String,
    annotations: Vec<Annotation>,
    parameters: Vec<Vec<Annotation>>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    annotations: Vec<Annotation>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    major: u16,
}

impl ClassFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            major: 52,
        }
    }

    pub fn without_super(mut self) -> Self {
        self.super_name = None;
        self
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.super_name = Some(name.to_string());
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn field(mut self, name: &str, annotations: Vec<Annotation>) -> Self {
        self.fields.push(Member {
            name: name.to_string(),
            descriptor: "Ljava/lang/String;".to_string(),
            annotations,
            parameters: Vec::new(),
        });
        self
    }

    pub fn method(mut self, name: &str, annotations: Vec<Annotation>) -> Self {
        self.methods.push(Member {
            name: name.to_string(),
            descriptor: "()V".to_string(),
            annotations,
            parameters: Vec::new(),
        });
        self
    }

    pub fn method_with_parameters(mut self, name: &str, parameters: Vec<Vec<Annotation>>) -> Self {
        let descriptor = format!("({})V", "Ljava/lang/String;".repeat(parameters.len()));
        self.methods.push(Member {
            name: name.to_string(),
            descriptor,
            annotations: Vec::new(),
            parameters,
        });
        self
    }

    pub fn version(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let mut body = Vec::new();

        // Entries the reader has to step over without ever decoding them.
        pool.long(0x0102_0304_0506_0708);
        pool.string_bytes(&[0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80, 0xC0, 0x80]);
        pool.int(42);

        put_u2(&mut body, 0x0021);
        put_u2(&mut body, pool.class(&self.name));
        let super_index = self.super_name.as_deref().map_or(0, |s| pool.class(s));
        put_u2(&mut body, super_index);

        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u2(&mut body, pool.class(interface));
        }

        put_u2(&mut body, self.fields.len() as u16);
        for field in &self.fields {
            write_member(&mut body, &mut pool, field, false);
        }

        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            write_member(&mut body, &mut pool, method, true);
        }

        let mut attributes = annotation_attributes(&mut pool, &self.annotations);
        let source_file = pool.utf8("Generated.java");
        let mut value = Vec::new();
        put_u2(&mut value, source_file);
        attributes.push(attribute(&mut pool, "SourceFile", &value));
        put_u2(&mut body, attributes.len() as u16);
        for attr in attributes {
            body.extend_from_slice(&attr);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        put_u2(&mut out, 0);
        put_u2(&mut out, self.major);
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

pub fn descriptor(type_name: &str) -> String {
    format!("L{};", type_name.replace('.', "/"))
}

fn write_member(out: &mut Vec<u8>, pool: &mut Pool, member: &Member, with_code: bool) {
    put_u2(out, 0x0001);
    put_u2(out, pool.utf8(&member.name));
    put_u2(out, pool.utf8(&member.descriptor));

    let mut attributes = annotation_attributes(pool, &member.annotations);
    for visible in [true, false] {
        let selected: Vec<Vec<&Annotation>> = member
            .parameters
            .iter()
            .map(|params| params.iter().filter(|a| a.visible == visible).collect())
            .collect();
        if selected.iter().all(|p| p.is_empty()) {
            continue;
        }
        let mut value = vec![selected.len() as u8];
        for params in selected {
            put_u2(&mut value, params.len() as u16);
            for annotation in params {
                write_annotation(&mut value, pool, annotation);
            }
        }
        let name = if visible {
            "RuntimeVisibleParameterAnnotations"
        } else {
            "RuntimeInvisibleParameterAnnotations"
        };
        attributes.push(attribute(pool, name, &value));
    }
    if with_code {
        attributes.push(attribute(pool, "Code", &[0, 1, 0, 1, 0, 0, 0, 1, 0xB1, 0, 0, 0, 0]));
    }

    put_u2(out, attributes.len() as u16);
    for attr in attributes {
        out.extend_from_slice(&attr);
    }
}

fn annotation_attributes(pool: &mut Pool, annotations: &[Annotation]) -> Vec<Vec<u8>> {
    let mut attributes = Vec::new();
    for visible in [true, false] {
        let selected: Vec<&Annotation> =
            annotations.iter().filter(|a| a.visible == visible).collect();
        if selected.is_empty() {
            continue;
        }
        let mut value = Vec::new();
        put_u2(&mut value, selected.len() as u16);
        for annotation in selected {
            write_annotation(&mut value, pool, annotation);
        }
        let name = if visible {
            "RuntimeVisibleAnnotations"
        } else {
            "RuntimeInvisibleAnnotations"
        };
        attributes.push(attribute(pool, name, &value));
    }
    attributes
}

fn write_annotation(out: &mut Vec<u8>, pool: &mut Pool, annotation: &Annotation) {
    put_u2(out, pool.utf8(&annotation.descriptor));
    put_u2(out, annotation.elements.len() as u16);
    for (name, element) in &annotation.elements {
        put_u2(out, pool.utf8(name));
        write_element(out, pool, element);
    }
}

fn write_element(out: &mut Vec<u8>, pool: &mut Pool, element: &Element) {
    match element {
        Element::Str(s) => {
            out.push(b's');
            put_u2(out, pool.utf8(s));
        }
        Element::Int(v) => {
            out.push(b'I');
            put_u2(out, pool.int(*v));
        }
        Element::Long(v) => {
            out.push(b'J');
            put_u2(out, pool.long(*v));
        }
        Element::Enum(type_name, constant) => {
            out.push(b'e');
            put_u2(out, pool.utf8(&descriptor(type_name)));
            put_u2(out, pool.utf8(constant));
        }
        Element::Class(type_name) => {
            out.push(b'c');
            put_u2(out, pool.utf8(&descriptor(type_name)));
        }
        Element::Nested(annotation) => {
            out.push(b'@');
            write_annotation(out, pool, annotation);
        }
        Element::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for value in values {
                write_element(out, pool, value);
            }
        }
    }
}

fn attribute(pool: &mut Pool, name: &str, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    put_u2(&mut out, pool.utf8(name));
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

struct Pool {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<Vec<u8>, u16>,
    classes: HashMap<String, u16>,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
        }
    }
}

impl Pool {
    fn utf8(&mut self, value: &str) -> u16 {
        self.utf8_bytes(value.as_bytes())
    }

    fn utf8_bytes(&mut self, value: &[u8]) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        self.bytes.push(1);
        put_u2(&mut self.bytes, value.len() as u16);
        self.bytes.extend_from_slice(value);
        let index = self.take(1);
        self.utf8.insert(value.to_vec(), index);
        index
    }

    fn class(&mut self, qualified_name: &str) -> u16 {
        if let Some(index) = self.classes.get(qualified_name) {
            return *index;
        }
        let name_index = self.utf8(&qualified_name.replace('.', "/"));
        self.bytes.push(7);
        put_u2(&mut self.bytes, name_index);
        let index = self.take(1);
        self.classes.insert(qualified_name.to_string(), index);
        index
    }

    fn string_bytes(&mut self, value: &[u8]) -> u16 {
        let utf8 = self.utf8_bytes(value);
        self.bytes.push(8);
        put_u2(&mut self.bytes, utf8);
        self.take(1)
    }

    fn int(&mut self, value: i32) -> u16 {
        self.bytes.push(3);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.take(1)
    }

    fn long(&mut self, value: i64) -> u16 {
        self.bytes.push(5);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.take(2)
    }

    fn take(&mut self, slots: u16) -> u16 {
        let index = self.next;
        self.next += slots;
        index
    }
}
