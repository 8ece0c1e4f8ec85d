use super::statement::*;
use super::tokenizer;
use super::validator;
use crate::errors;
use std::collections::VecDeque;

/// Parses an `INSERT` statement from tokenized SQL.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the parsed `InsertStatement` or an `errors::Error`.
fn parse_insert(sql: &mut VecDeque<String>) -> Result<InsertStatement, errors::Error> {
    expect_token(sql, "INTO", "'INSERT' must be followed by 'INTO'.")?;
    let table = pop_token(sql, "'INSERT INTO' must be followed by a table name.")?;
    let columns_sql = pop_token(
        sql,
        "'INSERT INTO table' must be followed by column names in parentheses.",
    )?;
    let (columns, values) = parse_columns_and_values(sql, columns_sql)?;
    Ok(InsertStatement {
        table,
        columns,
        values,
    })
}

/// Parses a `SELECT` statement from tokenized SQL.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the parsed `SelectStatement` or an `errors::Error`.
fn parse_select(sql: &mut VecDeque<String>) -> Result<SelectStatement, errors::Error> {
    let mut columns_sql = String::new();
    while let Some(token) = sql.front() {
        if token.to_uppercase() == "FROM" {
            sql.pop_front(); // Consume "FROM"
            break;
        }
        columns_sql.push_str(&sql.pop_front().unwrap());
    }
    if columns_sql.is_empty() {
        return Err(errors::Error::Syntax(
            "'SELECT' must specify columns.".to_owned(),
        ));
    }
    let columns = parse_columns(columns_sql)?;
    let table = pop_token(sql, "'SELECT ... FROM' must be followed by a table name.")?;
    let where_clause = parse_where_clause(sql)?;
    Ok(SelectStatement {
        table,
        columns,
        where_clause,
    })
}

/// Parses a `CREATE TABLE` statement from tokenized SQL.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the parsed `CreateTableStatement` or an `errors::Error`.
fn parse_create(sql: &mut VecDeque<String>) -> Result<CreateTableStatement, errors::Error> {
    expect_token(sql, "TABLE", "'CREATE' must be followed by 'TABLE'.")?;
    parse_create_table(sql)
}

/// Parses a `SHOW TABLES` statement from tokenized SQL.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` indicating success or an `errors::Error`.
fn parse_show(tokens: &mut VecDeque<String>) -> Result<(), errors::Error> {
    expect_token(tokens, "TABLES", "'SHOW' must be followed by 'TABLES'.")?;
    Ok(())
}

/// Parses a `DROP TABLE` statement from tokenized SQL.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the dropped table's name or an `errors::Error`.
fn parse_drop(tokens: &mut VecDeque<String>) -> Result<String, errors::Error> {
    expect_token(tokens, "TABLE", "'DROP' must be followed by 'TABLE'.")?;
    pop_token(tokens, "'DROP TABLE' must be followed by a table name.")
}

/// Parses a `DELETE` statement from tokenized SQL.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the parsed `DeleteStatement` or an `errors::Error`.
fn parse_delete(tokens: &mut VecDeque<String>) -> Result<DeleteStatement, errors::Error> {
    expect_token(tokens, "FROM", "'DELETE' must be followed by 'FROM'.")?;
    let table = pop_token(tokens, "'DELETE FROM' must be followed by a table name.")?;
    let where_clause = parse_where_clause(tokens)?;
    Ok(DeleteStatement {
        table,
        where_clause,
    })
}

/// Parses an `UPDATE` statement from tokenized SQL.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the parsed `UpdateStatement` or an `errors::Error`.
fn parse_update(tokens: &mut VecDeque<String>) -> Result<UpdateStatement, errors::Error> {
    let table = pop_token(tokens, "'UPDATE' must be followed by a table name.")?;
    expect_token(tokens, "SET", "'UPDATE table' must be followed by 'SET'.")?;
    let mut sets = Vec::new();
    while let Some(token) = tokens.front() {
        if token.to_uppercase() == "WHERE" {
            break;
        }
        let column = pop_token(tokens, "Missing column in SET clause.")?;
        expect_token(tokens, "=", "Expected '=' after column in SET clause.")?;
        let value = pop_token(tokens, "Missing value after '=' in SET clause.")?;
        sets.push((column, value));
    }
    let where_clause = parse_where_clause(tokens)?;
    Ok(UpdateStatement {
        table,
        sets,
        where_clause,
    })
}

/// Parses a `CREATE TABLE` statement with column schemas.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the parsed `CreateTableStatement` or an `errors::Error`.
fn parse_create_table(sql: &mut VecDeque<String>) -> Result<CreateTableStatement, errors::Error> {
    let name = pop_token(sql, "'CREATE TABLE' must be followed by a table name.")?;
    let columns_sql = pop_token(
        sql,
        "'CREATE TABLE name' must be followed by column definitions in parentheses.",
    )?;
    if !columns_sql.starts_with('(') || !columns_sql.ends_with(')') {
        return Err(errors::Error::Syntax(
            "Column definitions must be enclosed in parentheses.".to_owned(),
        ));
    }
    let columns_str = &columns_sql[1..columns_sql.len() - 1];
    let columns_schemas = parse_column_schemas(columns_str)?;
    Ok(CreateTableStatement {
        name,
        columns_schemas,
    })
}

/// Helper function to expect and consume a specific token.
///
/// # Arguments
/// * `tokens` - The token queue.
/// * `expected` - The token to expect (case-insensitive).
/// * `error_msg` - The error message if the token is not found.
///
/// # Returns
/// A `Result` indicating success or an `errors::Error`.
fn expect_token(
    tokens: &mut VecDeque<String>,
    expected: &str,
    error_msg: &str,
) -> Result<(), errors::Error> {
    match tokens.pop_front() {
        Some(token) if token.to_uppercase() == expected.to_uppercase() => Ok(()),
        _ => Err(errors::Error::Syntax(error_msg.to_owned())),
    }
}

/// Helper function to pop a token or return an error.
///
/// # Arguments
/// * `tokens` - The token queue.
/// * `error_msg` - The error message if no token is available.
///
/// # Returns
/// A `Result` containing the token or an `errors::Error`.
fn pop_token(tokens: &mut VecDeque<String>, error_msg: &str) -> Result<String, errors::Error> {
    tokens
        .pop_front()
        .ok_or_else(|| errors::Error::Syntax(error_msg.to_owned()))
}

/// Parses columns and values for `INSERT` statements.
///
/// # Arguments
/// * `tokens` - The token queue.
/// * `columns_sql` - The string containing column definitions.
///
/// # Returns
/// A `Result` containing a tuple of column and value vectors or an `errors::Error`.
fn parse_columns_and_values(
    tokens: &mut VecDeque<String>,
    columns_sql: String,
) -> Result<(Vec<String>, Vec<String>), errors::Error> {
    if !columns_sql.starts_with('(') || !columns_sql.ends_with(')') {
        return Err(errors::Error::Syntax(
            "Column names must be enclosed in parentheses.".to_owned(),
        ));
    }
    let columns = columns_sql[1..columns_sql.len() - 1]
        .split(',')
        .map(|s| validator::validate_column_name(s.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    expect_token(
        tokens,
        "VALUES",
        "'INSERT INTO table (...)' must be followed by 'VALUES'.",
    )?;
    let values_sql = pop_token(
        tokens,
        "'VALUES' must be followed by values in parentheses.",
    )?;
    if !values_sql.starts_with('(') || !values_sql.ends_with(')') {
        return Err(errors::Error::Syntax(
            "Values must be enclosed in parentheses.".to_owned(),
        ));
    }
    let values = values_sql[1..values_sql.len() - 1]
        .split(',')
        .map(|s| validator::validate_value(s.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    if columns.len() != values.len() {
        return Err(errors::Error::Syntax(format!(
            "Column count ({}) does not match value count ({}).",
            columns.len(),
            values.len()
        )));
    }
    Ok((columns, values))
}

/// Parses column names for `SELECT` statements.
///
/// # Arguments
/// * `columns_sql` - The string containing column definitions.
///
/// # Returns
/// A `Result` containing the `Columns` enum or an `errors::Error`.
fn parse_columns(columns_sql: String) -> Result<Columns, errors::Error> {
    let trimmed = columns_sql.replace(" ", "");
    if trimmed == "*" {
        Ok(Columns::All)
    } else {
        let columns = trimmed
            .split(',')
            .map(|s| validator::validate_column_name(s.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(errors::Error::Syntax(
                "No columns specified in SELECT.".to_owned(),
            ));
        }
        Ok(Columns::List(columns))
    }
}

/// Parses column schemas for `CREATE TABLE`.
///
/// # Arguments
/// * `columns_str` - The string containing column definitions.
///
/// # Returns
/// A `Result` containing a vector of `ColumnSchema` or an `errors::Error`.
fn parse_column_schemas(columns_str: &str) -> Result<Vec<ColumnSchema>, errors::Error> {
    let mut schemas = Vec::new();
    for column_def in columns_str.split(',') {
        let parts: Vec<&str> = column_def.trim().split_whitespace().collect();
        if parts.is_empty() {
            continue; // Skip empty definitions
        }
        let name = validator::validate_column_name(parts[0])?;
        let type_str = parts
            .get(1)
            .ok_or_else(|| errors::Error::Syntax(format!("Column '{}' missing type.", name)))?;
        let type_ = parse_column_type(type_str)?;
        let mut is_primary = false;
        let mut default = None;
        let mut i = 2;
        while i < parts.len() {
            match parts[i].to_uppercase().as_str() {
                "PRIMARY" => {
                    i += 1;
                    expect_keyword(&parts, i, "KEY", "PRIMARY must be followed by KEY.")?;
                    is_primary = true;
                    i += 1;
                }
                "DEFAULT" => {
                    i += 1;
                    default = Some(pop_value(
                        &parts,
                        i,
                        "DEFAULT must be followed by a value.",
                    )?);
                    i += 1;
                }
                _ => break,
            }
        }
        schemas.push(ColumnSchema {
            name,
            is_primary,
            type_,
            default,
        });
    }
    if schemas.is_empty() {
        return Err(errors::Error::Syntax(
            "No valid column definitions found.".to_owned(),
        ));
    }
    Ok(schemas)
}

/// Parses a column type from a string.
///
/// # Arguments
/// * `type_str` - The type string to parse.
///
/// # Returns
/// A `Result` containing the `ColumnType` or an `errors::Error`.
fn parse_column_type(type_str: &str) -> Result<ColumnType, errors::Error> {
    validator::validate_column_type(type_str)?;
    let upper = type_str.to_uppercase();

    match upper.as_str() {
        "INT" => Ok(ColumnType::Int),
        "DOUBLE" => Ok(ColumnType::Double),
        "TEXT" => Ok(ColumnType::Text),
        _ => Err(errors::Error::Syntax(format!(
            "Unsupported column type: {}.",
            type_str
        ))),
    }
}

/// Helper to expect a keyword in a parts array.
///
/// # Arguments
/// * `parts` - The array of parts.
/// * `index` - The index to check.
/// * `expected` - The expected keyword.
/// * `error_msg` - The error message if not found.
///
/// # Returns
/// A `Result` indicating success or an `errors::Error`.
fn expect_keyword(
    parts: &[&str],
    index: usize,
    expected: &str,
    error_msg: &str,
) -> Result<(), errors::Error> {
    if parts
        .get(index)
        .map_or(false, |&p| p.to_uppercase() == expected)
    {
        Ok(())
    } else {
        Err(errors::Error::Syntax(error_msg.to_owned()))
    }
}

/// Helper to pop a value from a parts array.
///
/// # Arguments
/// * `parts` - The array of parts.
/// * `index` - The index to pop from.
/// * `error_msg` - The error message if not found.
///
/// # Returns
/// A `Result` containing the value or an `errors::Error`.
fn pop_value(parts: &[&str], index: usize, error_msg: &str) -> Result<String, errors::Error> {
    parts
        .get(index)
        .map(|&s| s.to_string())
        .ok_or_else(|| errors::Error::Syntax(error_msg.to_owned()))
}

/// Parses an optional `WHERE column op value` clause. Only a single
/// predicate is supported: no `AND`/`OR` composition.
///
/// # Arguments
/// * `tokens` - The token queue.
///
/// # Returns
/// A `Result` containing an optional `WhereClause` or an `errors::Error`.
fn parse_where_clause(sql: &mut VecDeque<String>) -> Result<Option<WhereClause>, errors::Error> {
    if let Some(token) = sql.front() {
        if token.to_uppercase() == "WHERE" {
            sql.pop_front(); // Consume "WHERE"
            let predicate = sql.drain(..).collect::<Vec<_>>().join(" ");
            if predicate.is_empty() {
                return Err(errors::Error::Syntax(
                    "WHERE clause cannot be empty.".to_owned(),
                ));
            }
            return Ok(Some(parse_predicate(&predicate)?));
        }
    }
    Ok(None)
}

/// Splits a raw `column op value` predicate string into a `WhereClause`.
///
/// # Arguments
/// * `predicate` - The raw predicate text following `WHERE`.
///
/// # Returns
/// A `Result` containing the parsed `WhereClause` or an `errors::Error`.
fn parse_predicate(predicate: &str) -> Result<WhereClause, errors::Error> {
    let op_pos = predicate
        .find(|c| c == '=' || c == '<' || c == '>')
        .ok_or_else(|| {
            errors::Error::Syntax(
                "WHERE clause must contain one of '=', '<', '>'.".to_owned(),
            )
        })?;
    let (column_part, rest) = predicate.split_at(op_pos);
    let op = match rest.as_bytes()[0] {
        b'=' => CompareOp::Eq,
        b'<' => CompareOp::Lt,
        b'>' => CompareOp::Gt,
        _ => unreachable!(),
    };
    let column = validator::validate_column_name(column_part.trim())?;
    let value = validator::validate_value(rest[1..].trim())?;
    Ok(WhereClause { column, op, value })
}

/// Parses a `DESC <table>` statement.
///
/// # Arguments
/// * `sql` - A mutable `VecDeque<String>` of SQL tokens.
///
/// # Returns
/// A `Result` containing the parsed `DescStatement` or an `errors::Error`.
fn parse_desc(sql: &mut VecDeque<String>) -> Result<DescStatement, errors::Error> {
    let table = pop_token(sql, "'DESC' must be followed by a table name.")?;
    Ok(DescStatement { table })
}

/// Parses a full SQL statement.
///
/// # Arguments
/// * `raw_sql` - The raw SQL string to parse.
///
/// # Returns
/// A `Result` containing the parsed `SqlCommand` or an `errors::Error`.
pub fn parse(raw_sql: String) -> Result<SqlCommand, errors::Error> {
    let mut tokens = tokenizer::tokenize_sql(raw_sql.strip_suffix(';').unwrap_or(&raw_sql))?;

    let first = pop_token(&mut tokens, "SQL statement cannot be empty.")?.to_uppercase();
    let statement = match first.as_str() {
        "SELECT" => Statement::Select(parse_select(&mut tokens)?),
        "INSERT" => Statement::Insert(parse_insert(&mut tokens)?),
        "UPDATE" => Statement::Update(parse_update(&mut tokens)?),
        "DELETE" => Statement::Delete(parse_delete(&mut tokens)?),
        "CREATE" => Statement::CreateTable(parse_create(&mut tokens)?),
        "DROP" => Statement::DropTable(parse_drop(&mut tokens)?),
        "SHOW" => {
            parse_show(&mut tokens)?;
            Statement::ShowTables
        }
        "DESC" | "DESCRIBE" => Statement::Desc(parse_desc(&mut tokens)?),
        _ => {
            return Err(errors::Error::Syntax(format!(
                "Unrecognized statement: {}.",
                first
            )))
        }
    };
    if !tokens.is_empty() {
        return Err(errors::Error::Syntax(
            "Unexpected tokens after statement.".to_owned(),
        ));
    }
    Ok(SqlCommand {
        statement,
        sql: raw_sql,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_with_where_clause_splits_column_op_value() {
        let cmd = parse("SELECT * FROM users WHERE id > 5".to_owned()).unwrap();
        let Statement::Select(select) = cmd.statement else {
            panic!("expected a Select statement");
        };
        let where_clause = select.where_clause.expect("expected a WHERE clause");
        assert_eq!(where_clause.column, "id");
        assert_eq!(where_clause.op, CompareOp::Gt);
        assert_eq!(where_clause.value, "5");
    }

    #[test]
    fn select_without_where_clause_is_none() {
        let cmd = parse("SELECT * FROM users".to_owned()).unwrap();
        let Statement::Select(select) = cmd.statement else {
            panic!("expected a Select statement");
        };
        assert!(select.where_clause.is_none());
    }

    #[test]
    fn delete_where_clause_accepts_equals_on_text_value() {
        let cmd = parse("DELETE FROM users WHERE name='bob'".to_owned()).unwrap();
        let Statement::Delete(delete) = cmd.statement else {
            panic!("expected a Delete statement");
        };
        let where_clause = delete.where_clause.expect("expected a WHERE clause");
        assert_eq!(where_clause.column, "name");
        assert_eq!(where_clause.op, CompareOp::Eq);
        assert_eq!(where_clause.value, "bob");
    }

    #[test]
    fn create_table_only_accepts_the_three_supported_column_types() {
        let cmd = parse("CREATE TABLE users (id INT PRIMARY KEY, score DOUBLE)".to_owned())
            .unwrap();
        let Statement::CreateTable(create) = cmd.statement else {
            panic!("expected a CreateTableStatement");
        };
        assert_eq!(create.columns_schemas.len(), 2);
        assert!(create.columns_schemas[0].is_primary);

        assert!(matches!(
            parse_column_type("VARCHAR(32)"),
            Err(errors::Error::Syntax(_))
        ));
    }

    #[test]
    fn desc_parses_a_bare_table_name() {
        let cmd = parse("DESC users".to_owned()).unwrap();
        let Statement::Desc(desc) = cmd.statement else {
            panic!("expected a Desc statement");
        };
        assert_eq!(desc.table, "users");
    }
}
