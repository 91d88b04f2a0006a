//! Table reference extraction
//!
//! Walks a parsed statement and collects the tables it reads from. Names
//! defined by WITH clauses are not tables and are left out.

use sqlparser::ast::{
    Expr, ObjectName, Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use std::collections::HashSet;

/// Collects table references across one or more statements
#[derive(Debug, Default)]
pub struct TableReferenceCollector {
    /// CTE names visible at the current point of the walk, innermost last
    scopes: Vec<HashSet<String>>,

    /// Referenced tables in order of first appearance
    tables: Vec<String>,
}

impl TableReferenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables read by `statements`, CTEs removed, in order of first appearance
    pub fn collect(statements: &[Statement]) -> Vec<String> {
        let mut collector = Self::new();
        for statement in statements {
            collector.visit_statement(statement);
        }
        collector.finish()
    }

    pub fn finish(self) -> Vec<String> {
        self.tables
    }

    pub fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Query(query) => self.visit_query(query),
            Statement::Insert(insert) => {
                if let Some(source) = &insert.source {
                    self.visit_query(source);
                }
            }
            Statement::CreateTable(create) => {
                if let Some(query) = &create.query {
                    self.visit_query(query);
                }
            }
            Statement::CreateView { query, .. } => self.visit_query(query),
            _ => {}
        }
    }

    fn visit_query(&mut self, query: &Query) {
        let Some(with) = &query.with else {
            self.visit_set_expr(&query.body);
            return;
        };

        // A CTE is visible to itself, later CTEs and the query body only
        self.scopes.push(HashSet::new());
        for cte in &with.cte_tables {
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(cte.alias.name.value.to_lowercase());
            }
            self.visit_query(&cte.query);
        }
        self.visit_set_expr(&query.body);
        self.scopes.pop();
    }

    fn visit_set_expr(&mut self, set_expr: &SetExpr) {
        match set_expr {
            SetExpr::Select(select) => self.visit_select(select),
            SetExpr::Query(query) => self.visit_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            _ => {}
        }
    }

    fn visit_select(&mut self, select: &Select) {
        for table_with_joins in &select.from {
            self.visit_table_with_joins(table_with_joins);
        }

        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    self.visit_expr(expr);
                }
                _ => {}
            }
        }

        if let Some(selection) = &select.selection {
            self.visit_expr(selection);
        }

        if let Some(having) = &select.having {
            self.visit_expr(having);
        }
    }

    fn visit_table_with_joins(&mut self, table_with_joins: &TableWithJoins) {
        self.visit_table_factor(&table_with_joins.relation);
        for join in &table_with_joins.joins {
            self.visit_table_factor(&join.relation);
        }
    }

    fn visit_table_factor(&mut self, table_factor: &TableFactor) {
        match table_factor {
            TableFactor::Table { name, .. } => self.add_table(name),
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery),
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.visit_table_with_joins(table_with_joins);
            }
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Subquery(query) => self.visit_query(query),
            Expr::InSubquery { expr, subquery, .. } => {
                self.visit_expr(expr);
                self.visit_query(subquery);
            }
            Expr::Exists { subquery, .. } => self.visit_query(subquery),
            Expr::BinaryOp { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => self.visit_expr(expr),
            _ => {}
        }
    }

    fn is_cte(&self, table: &str) -> bool {
        let table = table.to_lowercase();
        self.scopes.iter().any(|scope| scope.contains(&table))
    }

    fn add_table(&mut self, name: &ObjectName) {
        let table = object_name_to_string(name);
        if !self.is_cte(&table) && !self.tables.contains(&table) {
            self.tables.push(table);
        }
    }
}

/// Dotted name without identifier quotes
pub fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}
