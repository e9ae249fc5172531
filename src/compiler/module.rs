use std::{path::PathBuf, rc::Rc};

use log::debug;

use crate::{
    common::{config::Config, source::Source, span::Span, span::Spanned},
    compiler::{
        ast::AST,
        lex::Lexer,
        parse::Parser,
        syntax::{Kind, Note, Syntax},
    },
};

/// Resolves `require`s while parsing.
/// Keeps track of the modules currently being loaded,
/// so a module that (transitively) requires itself is caught.
#[derive(Debug)]
pub struct Modules {
    config: Config,
    loading: Vec<PathBuf>,
}

/// Canonical form of a path, used to compare modules.
fn key(path: &std::path::Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl Modules {
    /// `root` is the source being parsed, if it lives on disk.
    pub fn new(config: &Config, root: &Source) -> Modules {
        let loading = if root.path.is_file() {
            vec![key(&root.path)]
        } else {
            vec![]
        };

        Modules {
            config: config.clone(),
            loading,
        }
    }

    /// Finds, lexes and parses the module `name`,
    /// returning its top level nodes.
    /// `span` is the location of the `require` asking for it.
    pub fn load(&mut self, name: &str, span: &Span) -> Result<Vec<Spanned<AST>>, Syntax> {
        let path = self
            .config
            .resolve(name)
            .ok_or_else(|| Syntax::module_not_found(name, span))?;
        debug!("resolved module `{}` to {}", name, path.display());

        let canonical = key(&path);
        if self.loading.contains(&canonical) {
            return Err(Syntax::error_with_note(
                &format!("Circular require of module `{}`", name),
                Note::new_with_hint("this module is already being loaded", span),
            ));
        }

        let source = Source::path(&path).map_err(|error| {
            Syntax::error(
                &format!("Could not read module `{}`: {}", path.display(), error),
                span,
            )
            .with_kind(Kind::ModuleNotFound)
        })?;
        let tokens = Lexer::lex(Rc::clone(&source))?;

        self.loading.push(canonical);
        let result = Parser::parse_module(tokens, source, self);
        self.loading.pop();
        result
    }
}
