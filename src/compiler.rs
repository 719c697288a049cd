use swc_common::comments::SingleThreadedComments;
use swc_common::sync::Lrc;
use swc_common::{FileName, Globals, Mark, SourceMap, Spanned, DUMMY_SP, GLOBALS};
use swc_ecma_ast::{
    ArrowExpr, BlockStmt, BlockStmtOrExpr, CallExpr, Callee, ClassDecl, Constructor, Decl, DefaultDecl, DoWhileStmt,
    EmptyStmt, EsVersion, Expr, ExprStmt, FnDecl, ForInStmt, ForOfStmt, ForStmt, Function, Ident, Invalid, Lit, Module,
    ModuleDecl, ModuleItem, SeqExpr, Stmt, WhileStmt,
};
use swc_ecma_codegen::text_writer::JsWriter;
use swc_ecma_codegen::Emitter;
use swc_ecma_parser::{lexer::Lexer, EsConfig, Parser, StringInput, Syntax, TsConfig};
use swc_ecma_transforms_base::fixer::fixer;
use swc_ecma_transforms_base::hygiene::hygiene;
use swc_ecma_transforms_base::resolver;
use swc_ecma_transforms_react::{react, Options as ReactOptions};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::{FoldWith, VisitMut, VisitMutWith};

use crate::error::CompileError;

/// Global the sandbox defines; compiled loops and functions call it on
/// every iteration and entry.
pub const CHECKPOINT: &str = "__checkpoint";

/// Source language accepted by [`compile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    JavaScript,
    TypeScript,
    /// TypeScript with JSX.
    Tsx,
}

impl Dialect {
    fn syntax(self) -> Syntax {
        match self {
            Dialect::JavaScript => Syntax::Es(EsConfig {
                jsx: true,
                ..Default::default()
            }),
            Dialect::TypeScript => Syntax::Typescript(TsConfig::default()),
            Dialect::Tsx => Syntax::Typescript(TsConfig {
                tsx: true,
                ..Default::default()
            }),
        }
    }

    fn is_typescript(self) -> bool {
        !matches!(self, Dialect::JavaScript)
    }
}

/// Plain script text plus the module specifiers its imports referred to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    pub code: String,
    pub imports: Vec<String>,
}

/// Parses `source`, strips imports and exports, lowers TypeScript and JSX
/// and prints the result as a script.
pub fn compile(source: &str, dialect: Dialect) -> Result<CompiledModule, CompileError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Anon, source.to_string());

    let lexer = Lexer::new(dialect.syntax(), EsVersion::Es2022, StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);

    let parsed = parser.parse_module();
    let recovered = parser.take_errors();
    let mut module = match (parsed, recovered.into_iter().next()) {
        (Err(err), _) | (Ok(_), Some(err)) => return Err(syntax_error(&cm, err)),
        (Ok(module), None) => module,
    };

    let imports = strip_imports(&mut module);
    flatten_exports(&mut module);

    let module = GLOBALS.set(&Globals::new(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        let module = module.fold_with(&mut resolver(unresolved_mark, top_level_mark, dialect.is_typescript()));
        let module = if dialect.is_typescript() {
            module.fold_with(&mut strip(top_level_mark))
        } else {
            module
        };
        let module = module.fold_with(&mut react::<SingleThreadedComments>(
            cm.clone(),
            None,
            ReactOptions::default(),
            top_level_mark,
            unresolved_mark,
        ));
        let mut module = module;
        module.visit_mut_with(&mut Checkpoints::new(unresolved_mark));
        module.fold_with(&mut hygiene()).fold_with(&mut fixer(None))
    });

    let code = emit(&cm, &module)?;
    log::debug!("compiled {} bytes to {} bytes ({} imports)", source.len(), code.len(), imports.len());

    Ok(CompiledModule { code, imports })
}

fn syntax_error(cm: &Lrc<SourceMap>, err: swc_ecma_parser::error::Error) -> CompileError {
    let loc = cm.lookup_char_pos(err.span().lo);
    CompileError::Syntax {
        message: err.kind().msg().to_string(),
        line: loc.line,
        column: loc.col_display + 1,
    }
}

/// Removes every import declaration and returns the distinct specifiers in
/// source order.
fn strip_imports(module: &mut Module) -> Vec<String> {
    let mut imports: Vec<String> = Vec::new();
    module.body.retain(|item| match item {
        ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
            let specifier = import.src.value.to_string();
            if !imports.contains(&specifier) {
                imports.push(specifier);
            }
            false
        }
        ModuleItem::ModuleDecl(ModuleDecl::TsImportEquals(_)) => false,
        _ => true,
    });
    imports
}

/// Turns exported declarations into plain ones and drops re-exports, so the
/// module body runs as an ordinary script.
fn flatten_exports(module: &mut Module) {
    let body = std::mem::take(&mut module.body);
    module.body = body
        .into_iter()
        .filter_map(|item| match item {
            ModuleItem::Stmt(stmt) => Some(ModuleItem::Stmt(stmt)),
            ModuleItem::ModuleDecl(decl) => flatten_decl(decl).map(ModuleItem::Stmt),
        })
        .collect();
}

fn flatten_decl(decl: ModuleDecl) -> Option<Stmt> {
    match decl {
        ModuleDecl::ExportDecl(export) => Some(Stmt::Decl(export.decl)),
        ModuleDecl::ExportDefaultExpr(export) => Some(Stmt::Expr(ExprStmt {
            span: export.span,
            expr: export.expr,
        })),
        ModuleDecl::ExportDefaultDecl(export) => match export.decl {
            DefaultDecl::Fn(f) => Some(match f.ident {
                Some(ident) => Stmt::Decl(Decl::Fn(FnDecl {
                    ident,
                    declare: false,
                    function: f.function,
                })),
                None => Stmt::Expr(ExprStmt {
                    span: export.span,
                    expr: Box::new(Expr::Fn(f)),
                }),
            }),
            DefaultDecl::Class(c) => Some(match c.ident {
                Some(ident) => Stmt::Decl(Decl::Class(ClassDecl {
                    ident,
                    declare: false,
                    class: c.class,
                })),
                None => Stmt::Expr(ExprStmt {
                    span: export.span,
                    expr: Box::new(Expr::Class(c)),
                }),
            }),
            DefaultDecl::TsInterfaceDecl(_) => None,
        },
        _ => None,
    }
}

/// Puts a [`CHECKPOINT`] call at the top of every loop body and function
/// body. The callee carries the unresolved mark, so hygiene renames any
/// local binding that would shadow the global.
struct Checkpoints {
    callee: Ident,
}

impl Checkpoints {
    fn new(unresolved_mark: Mark) -> Self {
        Self {
            callee: Ident::new(CHECKPOINT.into(), DUMMY_SP.apply_mark(unresolved_mark)),
        }
    }

    fn call(&self) -> Box<Expr> {
        Box::new(Expr::Call(CallExpr {
            span: DUMMY_SP,
            callee: Callee::Expr(Box::new(Expr::Ident(self.callee.clone()))),
            args: Vec::new(),
            type_args: None,
        }))
    }

    fn stmt(&self) -> Stmt {
        Stmt::Expr(ExprStmt {
            span: DUMMY_SP,
            expr: self.call(),
        })
    }

    /// Inserts after the directive prologue.
    fn prepend(&self, stmts: &mut Vec<Stmt>) {
        let at = stmts.iter().take_while(|stmt| is_directive(stmt)).count();
        stmts.insert(at, self.stmt());
    }

    fn guard_loop(&self, body: &mut Stmt) {
        match body {
            Stmt::Block(block) => block.stmts.insert(0, self.stmt()),
            other => {
                let inner = std::mem::replace(other, Stmt::Empty(EmptyStmt { span: DUMMY_SP }));
                *other = Stmt::Block(BlockStmt {
                    span: DUMMY_SP,
                    stmts: vec![self.stmt(), inner],
                });
            }
        }
    }
}

fn is_directive(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(ExprStmt { expr, .. }) if matches!(**expr, Expr::Lit(Lit::Str(_))))
}

impl VisitMut for Checkpoints {
    fn visit_mut_for_stmt(&mut self, n: &mut ForStmt) {
        n.visit_mut_children_with(self);
        self.guard_loop(&mut n.body);
    }

    fn visit_mut_for_in_stmt(&mut self, n: &mut ForInStmt) {
        n.visit_mut_children_with(self);
        self.guard_loop(&mut n.body);
    }

    fn visit_mut_for_of_stmt(&mut self, n: &mut ForOfStmt) {
        n.visit_mut_children_with(self);
        self.guard_loop(&mut n.body);
    }

    fn visit_mut_while_stmt(&mut self, n: &mut WhileStmt) {
        n.visit_mut_children_with(self);
        self.guard_loop(&mut n.body);
    }

    fn visit_mut_do_while_stmt(&mut self, n: &mut DoWhileStmt) {
        n.visit_mut_children_with(self);
        self.guard_loop(&mut n.body);
    }

    fn visit_mut_function(&mut self, n: &mut Function) {
        n.visit_mut_children_with(self);
        if let Some(body) = &mut n.body {
            self.prepend(&mut body.stmts);
        }
    }

    fn visit_mut_constructor(&mut self, n: &mut Constructor) {
        n.visit_mut_children_with(self);
        if let Some(body) = &mut n.body {
            self.prepend(&mut body.stmts);
        }
    }

    fn visit_mut_arrow_expr(&mut self, n: &mut ArrowExpr) {
        n.visit_mut_children_with(self);
        match &mut *n.body {
            BlockStmtOrExpr::BlockStmt(block) => self.prepend(&mut block.stmts),
            BlockStmtOrExpr::Expr(expr) => {
                let inner = std::mem::replace(expr, Box::new(Expr::Invalid(Invalid { span: DUMMY_SP })));
                *expr = Box::new(Expr::Seq(SeqExpr {
                    span: DUMMY_SP,
                    exprs: vec![self.call(), inner],
                }));
            }
        }
    }
}

fn emit(cm: &Lrc<SourceMap>, module: &Module) -> Result<String, CompileError> {
    let mut buf = Vec::new();
    {
        let mut emitter = Emitter {
            cfg: swc_ecma_codegen::Config::default(),
            cm: cm.clone(),
            comments: None,
            wr: JsWriter::new(cm.clone(), "\n", &mut buf, None),
        };
        emitter.emit_module(module).map_err(|e| CompileError::Emit(e.to_string()))?;
    }
    String::from_utf8(buf).map_err(|e| CompileError::Emit(e.to_string()))
}
