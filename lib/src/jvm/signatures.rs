//! Rewriting the class names inside generic signatures
//!
//! Signatures (from `Signature` and `LocalVariableTypeTable` attributes) are a superset of
//! descriptors that also carry type parameters, type variables, wildcards and inner class
//! projections. Nothing here builds a model of the signature: the input is copied through as it
//! is parsed, and only the class names are passed through the mapping function.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.9.1

use super::Error;
use std::iter::Peekable;
use std::str::Chars;

/// Rewrite a class signature (`Signature` attribute on a class)
///
/// Returns `None` if no class name was changed by the mapping.
pub fn rewrite_class_signature<F>(signature: &str, map_class: F) -> Result<Option<String>, Error>
where
    F: FnMut(&str) -> Option<String>,
{
    SignatureRewriter::run(signature, map_class, |rewriter| {
        rewriter.type_parameters()?;
        rewriter.class_type()?;
        while rewriter.peek().is_some() {
            rewriter.class_type()?;
        }
        Ok(())
    })
}

/// Rewrite a method signature (`Signature` attribute on a method)
pub fn rewrite_method_signature<F>(signature: &str, map_class: F) -> Result<Option<String>, Error>
where
    F: FnMut(&str) -> Option<String>,
{
    SignatureRewriter::run(signature, map_class, |rewriter| {
        rewriter.type_parameters()?;
        rewriter.expect('(')?;
        while rewriter.peek() != Some(')') {
            rewriter.java_type()?;
        }
        rewriter.expect(')')?;
        if rewriter.peek() == Some('V') {
            rewriter.bump();
        } else {
            rewriter.java_type()?;
        }
        while rewriter.peek() == Some('^') {
            rewriter.bump();
            rewriter.reference_type()?;
        }
        Ok(())
    })
}

/// Rewrite a field signature (`Signature` attribute on a field, or a local variable type)
pub fn rewrite_field_signature<F>(signature: &str, map_class: F) -> Result<Option<String>, Error>
where
    F: FnMut(&str) -> Option<String>,
{
    SignatureRewriter::run(signature, map_class, |rewriter| rewriter.reference_type())
}

struct SignatureRewriter<'a, F> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    output: String,
    map_class: F,
    changed: bool,
}

impl<'a, F: FnMut(&str) -> Option<String>> SignatureRewriter<'a, F> {
    fn run(
        source: &'a str,
        map_class: F,
        rewrite: impl FnOnce(&mut Self) -> Result<(), Error>,
    ) -> Result<Option<String>, Error> {
        let mut rewriter = SignatureRewriter {
            source,
            chars: source.chars().peekable(),
            output: String::with_capacity(source.len()),
            map_class,
            changed: false,
        };
        rewrite(&mut rewriter)?;
        if rewriter.chars.peek().is_some() {
            return Err(rewriter.malformed("unexpected leftover input"));
        }
        Ok(if rewriter.changed {
            Some(rewriter.output)
        } else {
            None
        })
    }

    fn malformed(&self, reason: &str) -> Error {
        Error::MalformedDescriptor(format!("{} in signature '{}'", reason, self.source))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Copy the next character through to the output
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.output.push(c);
        Some(c)
    }

    fn expect(&mut self, expected: char) -> Result<(), Error> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.malformed(&format!("expected '{}'", expected))),
        }
    }

    /// Read (without copying) an identifier, stopping before any of the `stop` characters
    fn identifier(&mut self, stop: &[char]) -> Result<String, Error> {
        let mut identifier = String::new();
        while let Some(c) = self.chars.next_if(|c| !stop.contains(c)) {
            identifier.push(c);
        }
        if identifier.is_empty() {
            return Err(self.malformed("expected identifier"));
        }
        Ok(identifier)
    }

    /// `<T:Ljava/lang/Object;U::Ljava/lang/Comparable<TU;>;>`, if present
    fn type_parameters(&mut self) -> Result<(), Error> {
        if self.peek() != Some('<') {
            return Ok(());
        }
        self.bump();
        while self.peek() != Some('>') {
            let name = self.identifier(&[':', '>'])?;
            self.output.push_str(&name);

            // Class bound (possibly empty) followed by interface bounds
            self.expect(':')?;
            if !matches!(self.peek(), Some(':') | Some('>')) {
                self.reference_type()?;
            }
            while self.peek() == Some(':') {
                self.bump();
                self.reference_type()?;
            }
            if self.peek().is_none() {
                return Err(self.malformed("unterminated type parameters"));
            }
        }
        self.expect('>')
    }

    /// Base type or reference type
    fn java_type(&mut self) -> Result<(), Error> {
        match self.peek() {
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                self.bump();
                Ok(())
            }
            _ => self.reference_type(),
        }
    }

    /// Class type, type variable, or array type
    fn reference_type(&mut self) -> Result<(), Error> {
        match self.peek() {
            Some('L') => self.class_type(),
            Some('T') => {
                self.bump();
                let name = self.identifier(&[';'])?;
                self.output.push_str(&name);
                self.expect(';')
            }
            Some('[') => {
                self.bump();
                self.java_type()
            }
            _ => Err(self.malformed("expected reference type")),
        }
    }

    /// `Ljava/util/Map<TK;TV;>.Entry<TK;TV;>;`
    fn class_type(&mut self) -> Result<(), Error> {
        self.expect('L')?;
        let outer = self.identifier(&['<', '.', ';'])?;
        let mapped_outer = self.map(&outer);
        self.output.push_str(&mapped_outer);
        self.type_arguments()?;

        // Inner classes are named relative to their (unmapped) outer class
        let mut full_name = outer;
        let mut mapped_full_name = mapped_outer;
        while self.peek() == Some('.') {
            self.bump();
            let inner = self.identifier(&['<', '.', ';'])?;
            full_name = format!("{}${}", full_name, inner);
            let mapped = self.map(&full_name);
            let mapped_inner = match mapped.strip_prefix(&format!("{}$", mapped_full_name)) {
                Some(suffix) => suffix.to_owned(),
                None => match mapped.rfind('$') {
                    Some(dollar) => mapped[dollar + 1..].to_owned(),
                    None => inner,
                },
            };
            self.output.push_str(&mapped_inner);
            mapped_full_name = mapped;
            self.type_arguments()?;
        }
        self.expect(';')
    }

    /// `<TK;*+Ljava/lang/Number;>`, if present
    fn type_arguments(&mut self) -> Result<(), Error> {
        if self.peek() != Some('<') {
            return Ok(());
        }
        self.bump();
        loop {
            match self.peek() {
                Some('>') => break,
                Some('*') => {
                    self.bump();
                }
                Some('+' | '-') => {
                    self.bump();
                    self.reference_type()?;
                }
                Some(_) => self.reference_type()?,
                None => return Err(self.malformed("unterminated type arguments")),
            }
        }
        self.expect('>')
    }

    fn map(&mut self, class: &str) -> String {
        match (self.map_class)(class) {
            Some(mapped) if mapped != class => {
                self.changed = true;
                mapped
            }
            _ => class.to_owned(),
        }
    }
}
